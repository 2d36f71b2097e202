//! Oxford-IIIT Pet samples
//!
//! Wires the two resource archives into a lazy stream of [`Sample`]s:
//!
//! ```text
//! images ──filter(.jpg)─────────────────────────────────────────┐
//! annotations ──demux──┬─ lists ─filter({split}.txt)─parse─┐     │
//!                      └─ trimaps ─filter(!hidden)───── join(id)─join(id)─assemble
//! ```
//!
//! Samples follow the order of the split's classification list. An image id
//! missing from any of the three streams produces no sample.

use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::categories::default_categories;
use super::config::{PetConfig, Split};
use super::decode::{Decoder, Payload};
use crate::datapipe::{
    demux, KeyZipper, LineRecord, LineRecords, QueueDepth, RawEntry, ShardingFilter,
    ShuffleBuffer,
};
use crate::error::{PetError, Result};
use crate::metrics::standard::{ENTRIES_DROPPED, SAMPLES_EMITTED};
use crate::metrics::{DropReason, PipelineStats};
use crate::resource::{HttpResource, ResourceLoader};

pub const NAME: &str = "oxford-iiit-pet";
pub const HOMEPAGE: &str = "https://www.robots.ox.ac.uk/~vgg/data/pets/";

const IMAGES_URL: &str = "https://www.robots.ox.ac.uk/~vgg/data/pets/data/images.tar.gz";
const IMAGES_SHA256: &str = "67195c5e1c01f1ab5f9b6a5d22b8c27a580d896ece458917e61d459337fa318d";
const ANNOTATIONS_URL: &str = "https://www.robots.ox.ac.uk/~vgg/data/pets/data/annotations.tar.gz";
const ANNOTATIONS_SHA256: &str = "52425fb6de5c424942b7626b428656fcbd798db970a937df61750c0f1d358e91";

// ========== Classification & Filters ==========

/// Logical stream an annotation-archive entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationStream {
    /// Split/classification lists (`annotations/*.txt`)
    Classification = 0,
    /// Segmentation trimaps (`annotations/trimaps/*.png`)
    Segmentation = 1,
}

impl AnnotationStream {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Route an annotation entry by its parent directory; `None` drops it
pub fn classify_annotation(entry: &RawEntry) -> Option<AnnotationStream> {
    match entry.parent_name() {
        "annotations" => Some(AnnotationStream::Classification),
        "trimaps" => Some(AnnotationStream::Segmentation),
        _ => None,
    }
}

pub fn is_image(entry: &RawEntry) -> bool {
    entry.suffix() == ".jpg"
}

/// Rejects hidden files such as `._Abyssinian_1.png` metadata artifacts
pub fn is_segmentation(entry: &RawEntry) -> bool {
    !entry.name().starts_with('.')
}

pub fn is_split_list(entry: &RawEntry, split: Split) -> bool {
    entry.name() == split.list_file()
}

// ========== Records ==========

/// One row of a classification list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRecord {
    pub image_id: String,
    /// 1-based class id as written in the list
    pub label: i64,
    pub species_raw: String,
}

impl ClassificationRecord {
    /// Parse `image_id label species [breed_id]`
    pub fn from_line(record: LineRecord) -> Result<Self> {
        let found = record.fields.len();
        if !(3..=4).contains(&found) {
            return Err(PetError::MalformedLine {
                path: record.path,
                line: record.line,
                expected: 3,
                found,
            });
        }

        let mut fields = record.fields.into_iter();
        let image_id = fields.next().unwrap_or_default();
        let label_raw = fields.next().unwrap_or_default();
        let species_raw = fields.next().unwrap_or_default();

        let label = label_raw.parse().map_err(|_| PetError::InvalidLabel {
            image_id: image_id.clone(),
            value: label_raw,
        })?;

        Ok(Self {
            image_id,
            label,
            species_raw,
        })
    }
}

/// Class label resolved against the category table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// 0-based index into the category table
    pub index: usize,
    pub category: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Species {
    Cat,
    Dog,
}

impl Species {
    /// `"1"` is a cat; every other code reads as a dog
    pub fn from_code(code: &str) -> Self {
        if code == "1" {
            Species::Cat
        } else {
            Species::Dog
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Species::Cat => "cat",
            Species::Dog => "dog",
        }
    }
}

/// Resolve a record's label and species.
///
/// An out-of-range label means the category table does not belong to this
/// dataset version, so it is an error rather than a skip.
pub fn decode_classification(
    record: &ClassificationRecord,
    categories: &[String],
) -> Result<(Label, Species)> {
    let out_of_range = || PetError::LabelOutOfRange {
        label: record.label,
        categories: categories.len(),
    };
    let index = record
        .label
        .checked_sub(1)
        .and_then(|index| usize::try_from(index).ok())
        .ok_or_else(out_of_range)?;
    let category = categories.get(index).ok_or_else(out_of_range)?;

    Ok((
        Label {
            index,
            category: category.clone(),
        },
        Species::from_code(&record.species_raw),
    ))
}

/// Final output unit of the pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub image_id: String,
    pub label: Label,
    pub species: Species,
    pub segmentation_path: String,
    pub segmentation: Payload,
    pub image_path: String,
    pub image: Payload,
}

fn payload(path: &str, data: Bytes, decoder: Option<&Decoder>) -> Result<Payload> {
    match decoder {
        Some(decode) => decode(path, &data).map(Payload::Decoded),
        None => Ok(Payload::Raw(data)),
    }
}

/// Build a sample from a fully joined `((record, trimap), image)` tuple
pub fn assemble_sample(
    joined: ((ClassificationRecord, RawEntry), RawEntry),
    categories: &[String],
    decoder: Option<&Decoder>,
) -> Result<Sample> {
    let ((record, segmentation), image) = joined;
    let (label, species) = decode_classification(&record, categories)?;

    Ok(Sample {
        image_id: record.image_id,
        label,
        species,
        segmentation: payload(&segmentation.path, segmentation.data, decoder)?,
        segmentation_path: segmentation.path,
        image: payload(&image.path, image.data, decoder)?,
        image_path: image.path,
    })
}

// ========== Pipeline ==========

type EntryIter = Box<dyn Iterator<Item = Result<RawEntry>> + Send>;
type RecordIter = Box<dyn Iterator<Item = Result<ClassificationRecord>> + Send>;

type AnnotationJoin = KeyZipper<
    RecordIter,
    EntryIter,
    String,
    fn(&ClassificationRecord) -> String,
    fn(&RawEntry) -> String,
>;
type SampleJoin = KeyZipper<
    AnnotationJoin,
    EntryIter,
    String,
    fn(&(ClassificationRecord, RawEntry)) -> String,
    fn(&RawEntry) -> String,
>;

fn record_key(record: &ClassificationRecord) -> String {
    record.image_id.clone()
}

fn annotation_key(joined: &(ClassificationRecord, RawEntry)) -> String {
    joined.0.image_id.clone()
}

fn stem_key(entry: &RawEntry) -> String {
    entry.stem().to_string()
}

/// Keep Ok items matching `keep`; count the rest as dropped. Errors pass.
fn keep_entries<I>(source: I, keep: impl Fn(&RawEntry) -> bool + Send + 'static) -> EntryIter
where
    I: Iterator<Item = Result<RawEntry>> + Send + 'static,
{
    Box::new(source.filter(move |item| match item {
        Ok(entry) => {
            let kept = keep(entry);
            if !kept {
                ENTRIES_DROPPED.record(DropReason::Filter);
            }
            kept
        }
        Err(_) => true,
    }))
}

/// Lazy stream of samples produced by [`OxfordPet::samples`]
pub struct Samples {
    join: SampleJoin,
    /// Annotation entries routed to a stream that has not pulled them yet
    queued: QueueDepth,
    categories: Arc<Vec<String>>,
    decoder: Option<Decoder>,
    stats: PipelineStats,
}

impl Samples {
    /// Entries currently held by the demultiplexer and both joins
    pub fn buffered(&self) -> usize {
        self.queued.get() + self.join.buffered() + self.join.left().buffered()
    }

    /// Counters for this stream alone
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }
}

impl Iterator for Samples {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        let joined = self.join.next();
        let buffered = self.buffered();
        self.stats.observe_buffered(buffered);
        self.stats.unmatched_records =
            self.join.unmatched_left() + self.join.left().unmatched_left();

        let sample = joined?.and_then(|joined| {
            assemble_sample(joined, &self.categories, self.decoder.as_ref())
        });
        if sample.is_ok() {
            self.stats.emitted += 1;
            SAMPLES_EMITTED.inc();
        }
        Some(sample)
    }
}

/// The Oxford-IIIT Pet dataset definition
#[derive(Clone)]
pub struct OxfordPet {
    config: PetConfig,
    categories: Arc<Vec<String>>,
    decoder: Option<Decoder>,
}

impl OxfordPet {
    /// Dataset with the built-in category table and no decoding
    pub fn new(config: PetConfig) -> Self {
        Self {
            config,
            categories: Arc::new(default_categories()),
            decoder: None,
        }
    }

    /// Replace the category table
    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = Arc::new(categories);
        self
    }

    /// Decode image and trimap bytes with `decoder`
    pub fn with_decoder(mut self, decoder: Decoder) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn config(&self) -> &PetConfig {
        &self.config
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Remote archives: images first, annotations second
    pub fn resources() -> [HttpResource; 2] {
        [
            HttpResource::new(IMAGES_URL, IMAGES_SHA256).with_decompress(true),
            HttpResource::new(ANNOTATIONS_URL, ANNOTATIONS_SHA256).with_decompress(true),
        ]
    }

    /// Build the sample stream from the two archives' entries.
    ///
    /// Nothing is read until the returned iterator is pulled.
    pub fn samples<I, A>(&self, images: I, annotations: A) -> Result<Samples>
    where
        I: IntoIterator<Item = Result<RawEntry>>,
        I::IntoIter: Send + 'static,
        A: IntoIterator<Item = Result<RawEntry>>,
        A::IntoIter: Send + 'static,
    {
        self.config.validate()?;
        let split = self.config.split;
        info!(
            "Building {} pipeline: split={}, shard={:?}, shuffle_seed={:?}",
            NAME, split, self.config.shard, self.config.shuffle_seed
        );

        let images = keep_entries(images.into_iter(), is_image);

        let annotations: EntryIter = Box::new(annotations.into_iter());
        let mut streams = demux(annotations, 2, |entry: &RawEntry| {
            let stream = classify_annotation(entry);
            if stream.is_none() {
                ENTRIES_DROPPED.record(DropReason::Unclassified);
            }
            stream.map(AnnotationStream::index)
        });
        let queued = streams
            .first()
            .map(|stream| stream.queue_depth())
            .unwrap_or_default();
        let segmentations = streams.pop().ok_or_else(|| PetError::Internal {
            message: "demux returned no segmentation stream".into(),
        })?;
        let lists = streams.pop().ok_or_else(|| PetError::Internal {
            message: "demux returned no classification stream".into(),
        })?;

        let lists = keep_entries(lists, move |entry| is_split_list(entry, split));
        let mut records: RecordIter = Box::new(
            LineRecords::new(lists).map(|line| line.and_then(ClassificationRecord::from_line)),
        );
        if let Some(shard) = self.config.shard {
            records = Box::new(ShardingFilter::new(records, shard));
        }
        if let Some(seed) = self.config.shuffle_seed {
            debug!("Shuffling records with seed {} (buffer {})", seed, self.config.shuffle_buffer);
            records = Box::new(ShuffleBuffer::new(records, self.config.shuffle_buffer, seed));
        }

        let segmentations = keep_entries(segmentations, is_segmentation);

        let annotations: AnnotationJoin = KeyZipper::new(
            records,
            segmentations,
            record_key as fn(&ClassificationRecord) -> String,
            stem_key as fn(&RawEntry) -> String,
        );
        let join: SampleJoin = KeyZipper::new(
            annotations,
            images,
            annotation_key as fn(&(ClassificationRecord, RawEntry)) -> String,
            stem_key as fn(&RawEntry) -> String,
        );

        Ok(Samples {
            join,
            queued,
            categories: self.categories.clone(),
            decoder: self.decoder.clone(),
            stats: PipelineStats::default(),
        })
    }

    /// Fetch, verify and extract both archives, then stream samples from disk
    pub async fn load(&self, loader: &ResourceLoader) -> Result<Samples> {
        let [images, annotations] = Self::resources();
        let images_dir = loader.prepare(&images).await?;
        let annotations_dir = loader.prepare(&annotations).await?;
        self.samples_from_dirs(&images_dir, &annotations_dir)
    }

    /// Stream samples from already extracted archive directories
    pub fn samples_from_dirs(&self, images_dir: &Path, annotations_dir: &Path) -> Result<Samples> {
        self.samples(
            ResourceLoader::entries(images_dir),
            ResourceLoader::entries(annotations_dir),
        )
    }
}
