//! End-to-end tests for the sample pipeline over in-memory archives

use std::sync::Arc;

use bytes::Bytes;
use petpipe_core::datapipe::RawEntry;
use petpipe_core::dataset::{ImageTensor, OxfordPet, Payload, PetConfig, Sample, Species, Split};
use petpipe_core::metrics::standard::ENTRIES_DROPPED;
use petpipe_core::metrics::DropReason;
use petpipe_core::{PetError, Result};

fn ok(entries: Vec<RawEntry>) -> Vec<Result<RawEntry>> {
    entries.into_iter().map(Ok).collect()
}

fn list(name: &str, body: &str) -> RawEntry {
    RawEntry::new(format!("annotations/{}", name), body.to_string())
}

fn trimap(id: &str) -> RawEntry {
    RawEntry::new(format!("annotations/trimaps/{}.png", id), format!("mask:{}", id))
}

fn image(id: &str) -> RawEntry {
    RawEntry::new(format!("images/{}.jpg", id), format!("jpeg:{}", id))
}

fn collect(dataset: &OxfordPet, images: Vec<RawEntry>, annotations: Vec<RawEntry>) -> Vec<Sample> {
    dataset
        .samples(ok(images), ok(annotations))
        .unwrap()
        .map(|s| s.unwrap())
        .collect()
}

#[test]
fn test_single_sample() {
    let dataset = OxfordPet::new(PetConfig::new(Split::Trainval));
    let samples = collect(
        &dataset,
        vec![image("catA")],
        vec![list("trainval.txt", "catA 1 1 1\n"), trimap("catA")],
    );

    assert_eq!(samples.len(), 1);
    let sample = &samples[0];
    assert!(sample.image_path.ends_with("catA.jpg"));
    assert!(sample.segmentation_path.ends_with("catA.png"));
    assert_eq!(sample.species, Species::Cat);
    assert_eq!(sample.label.index, 0);
    assert_eq!(sample.label.category, "Abyssinian");
    assert_eq!(sample.image, Payload::Raw(Bytes::from("jpeg:catA")));
    assert_eq!(sample.segmentation, Payload::Raw(Bytes::from("mask:catA")));
}

#[test]
fn test_missing_image_drops_sample() {
    let dataset = OxfordPet::new(PetConfig::default());
    let samples = dataset
        .samples(
            ok(vec![image("dogB")]),
            ok(vec![list("trainval.txt", "catA 1 1 1\n"), trimap("catA")]),
        )
        .unwrap();

    let results: Vec<Result<Sample>> = samples.collect();
    assert!(results.is_empty(), "inner join must drop catA without error");
}

#[test]
fn test_missing_trimap_or_record_drops_sample() {
    let dataset = OxfordPet::new(PetConfig::default());
    let samples = collect(
        &dataset,
        vec![image("a_1"), image("b_1"), image("c_1")],
        vec![
            list("trainval.txt", "a_1 1 1 1\nb_1 2 2 1\n"),
            trimap("a_1"),
            trimap("c_1"),
        ],
    );

    let ids: Vec<&str> = samples.iter().map(|s| s.image_id.as_str()).collect();
    assert_eq!(ids, vec!["a_1"]);
}

#[test]
fn test_other_splits_and_unknown_dirs_ignored() {
    let dataset = OxfordPet::new(PetConfig::new(Split::Test));
    let samples = collect(
        &dataset,
        vec![image("a_1"), image("b_1")],
        vec![
            list("list.txt", "#Image CLASS-ID SPECIES BREED ID\na_1 1 1 1\nb_1 2 2 1\n"),
            list("trainval.txt", "a_1 1 1 1\n"),
            list("test.txt", "b_1 2 2 1\n"),
            RawEntry::new("annotations/xmls/b_1.xml", "<annotation/>"),
            trimap("a_1"),
            trimap("b_1"),
        ],
    );

    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].image_id, "b_1");
    assert_eq!(samples[0].species, Species::Dog);
    assert_eq!(samples[0].label.category, "American Bulldog");
}

#[test]
fn test_out_of_order_streams_follow_list_order() {
    let ids = ["c_1", "a_1", "b_1", "d_1"];
    let body: String = ids.iter().map(|id| format!("{} 1 1 1\n", id)).collect();

    let mut annotations = vec![trimap("d_1"), trimap("b_1")];
    annotations.push(list("trainval.txt", &body));
    annotations.extend([trimap("a_1"), trimap("c_1")]);
    let images = vec![image("b_1"), image("a_1"), image("d_1"), image("c_1")];

    let dataset = OxfordPet::new(PetConfig::default());
    let samples = collect(&dataset, images, annotations);
    let got: Vec<&str> = samples.iter().map(|s| s.image_id.as_str()).collect();
    assert_eq!(got, ids);
}

#[test]
fn test_hidden_trimaps_never_pair() {
    let dataset = OxfordPet::new(PetConfig::default());
    let samples = collect(
        &dataset,
        vec![image("a_1")],
        vec![
            list("trainval.txt", "a_1 1 1 1\n"),
            RawEntry::new("annotations/trimaps/._a_1.png", "resource fork"),
            trimap("a_1"),
        ],
    );

    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].segmentation, Payload::Raw(Bytes::from("mask:a_1")));
}

#[test]
fn test_rebuild_is_idempotent() {
    let images = vec![image("b_1"), image("a_1"), image("c_1")];
    let annotations = vec![
        trimap("c_1"),
        list("trainval.txt", "a_1 1 1 1\nb_1 5 2 3\nc_1 9 2 1\n"),
        trimap("a_1"),
        trimap("b_1"),
    ];

    let dataset = OxfordPet::new(PetConfig::default());
    let first = collect(&dataset, images.clone(), annotations.clone());
    let second = collect(&dataset, images, annotations);
    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[test]
fn test_malformed_line_is_propagated() {
    let dataset = OxfordPet::new(PetConfig::default());
    let results: Vec<Result<Sample>> = dataset
        .samples(
            ok(vec![image("a_1")]),
            ok(vec![list("trainval.txt", "a_1 1\n"), trimap("a_1")]),
        )
        .unwrap()
        .collect();

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(PetError::MalformedLine { line: 1, found: 2, .. })));
}

#[test]
fn test_corrupt_list_bytes_are_an_error() {
    let dataset = OxfordPet::new(PetConfig::default());
    let corrupt = RawEntry::new("annotations/trainval.txt", b"a_1 1 1 1\nb\xff_1 1 1 1\n".to_vec());
    let results: Vec<Result<Sample>> = dataset
        .samples(ok(vec![image("a_1")]), ok(vec![corrupt, trimap("a_1")]))
        .unwrap()
        .collect();

    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(PetError::InvalidEncoding { path, .. }) => assert_eq!(path, "annotations/trainval.txt"),
        other => panic!("expected encoding error, got {:?}", other.as_ref().map(|s| &s.image_id)),
    }
}

#[test]
fn test_category_mismatch_is_fatal() {
    let dataset = OxfordPet::new(PetConfig::default())
        .with_categories(vec!["Only".to_string()]);
    let mut samples = dataset
        .samples(
            ok(vec![image("a_1"), image("b_1")]),
            ok(vec![
                list("trainval.txt", "a_1 1 1 1\nb_1 2 2 1\n"),
                trimap("a_1"),
                trimap("b_1"),
            ]),
        )
        .unwrap();

    assert_eq!(samples.next().unwrap().unwrap().label.category, "Only");
    assert!(matches!(
        samples.next().unwrap(),
        Err(PetError::LabelOutOfRange { label: 2, categories: 1 })
    ));
    assert!(samples.next().is_none());
}

#[test]
fn test_upstream_errors_surface() {
    let dataset = OxfordPet::new(PetConfig::default());
    let images: Vec<Result<RawEntry>> = vec![Err(PetError::Internal {
        message: "disk gone".into(),
    })];
    let results: Vec<Result<Sample>> = dataset
        .samples(images, ok(vec![list("trainval.txt", "a_1 1 1 1\n"), trimap("a_1")]))
        .unwrap()
        .collect();

    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(PetError::Internal { .. })));
}

#[test]
fn test_decoder_applied_to_both_buffers() {
    let decoder = Arc::new(|path: &str, data: &Bytes| -> Result<ImageTensor> {
        Ok(ImageTensor {
            channels: if path.ends_with(".png") { 1 } else { 3 },
            height: 1,
            width: data.len(),
            data: data.to_vec(),
        })
    });
    let dataset = OxfordPet::new(PetConfig::default()).with_decoder(decoder);
    let samples = collect(
        &dataset,
        vec![image("a_1")],
        vec![list("trainval.txt", "a_1 1 1 1\n"), trimap("a_1")],
    );

    let image = samples[0].image.as_decoded().unwrap();
    let mask = samples[0].segmentation.as_decoded().unwrap();
    assert_eq!(image.channels, 3);
    assert_eq!(mask.channels, 1);
    assert_eq!(image.data, b"jpeg:a_1".to_vec());
    assert!(samples[0].image.as_raw().is_none());
}

#[test]
fn test_shards_partition_samples() {
    let ids: Vec<String> = (1..=10).map(|i| format!("pug_{}", i)).collect();
    let body: String = ids.iter().map(|id| format!("{} 26 2 1\n", id)).collect();
    let images: Vec<RawEntry> = ids.iter().map(|id| image(id)).collect();
    let mut annotations = vec![list("trainval.txt", &body)];
    annotations.extend(ids.iter().map(|id| trimap(id)));

    let mut seen = Vec::new();
    for worker_id in 0..3 {
        let config = PetConfig::default().with_shard(worker_id, 3).unwrap();
        let dataset = OxfordPet::new(config);
        let samples = collect(&dataset, images.clone(), annotations.clone());
        assert!(!samples.is_empty());
        seen.extend(samples.into_iter().map(|s| s.image_id));
    }

    seen.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(seen, expected);
}

#[test]
fn test_seeded_shuffle_is_reproducible() {
    let ids: Vec<String> = (1..=40).map(|i| format!("pug_{}", i)).collect();
    let body: String = ids.iter().map(|id| format!("{} 26 2 1\n", id)).collect();
    let images: Vec<RawEntry> = ids.iter().map(|id| image(id)).collect();
    let mut annotations = vec![list("trainval.txt", &body)];
    annotations.extend(ids.iter().map(|id| trimap(id)));

    let dataset = OxfordPet::new(PetConfig::default().with_shuffle(42, 8));
    let first: Vec<String> = collect(&dataset, images.clone(), annotations.clone())
        .into_iter()
        .map(|s| s.image_id)
        .collect();
    let second: Vec<String> = collect(&dataset, images, annotations)
        .into_iter()
        .map(|s| s.image_id)
        .collect();

    assert_eq!(first, second);
    assert_ne!(first, ids);
    let mut sorted = first.clone();
    sorted.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(sorted, expected);
}

#[test]
fn test_invalid_shard_rejected_at_build() {
    let mut config = PetConfig::default();
    config.shard = Some(petpipe_core::datapipe::ShardSpec { worker_id: 4, num_workers: 2 });
    let dataset = OxfordPet::new(config);
    let result = dataset.samples(ok(vec![]), ok(vec![]));
    assert!(matches!(result, Err(PetError::InvalidShardSpec { .. })));
}

#[test]
fn test_buffered_counts_demux_queue() {
    let dataset = OxfordPet::new(PetConfig::default());
    let mut samples = dataset
        .samples(
            ok(vec![image("a_1")]),
            ok(vec![
                list("trainval.txt", "a_1 1 1 1\n"),
                trimap("a_1"),
                trimap("b_1"),
                trimap("c_1"),
                list("test.txt", "b_1 1 1 1\n"),
            ]),
        )
        .unwrap();

    assert_eq!(samples.next().unwrap().unwrap().image_id, "a_1");
    assert_eq!(samples.buffered(), 0);

    // The list stream reads past b_1 and c_1 looking for more records
    assert!(samples.next().is_none());
    assert_eq!(samples.buffered(), 2);

    let stats = samples.stats();
    assert_eq!(stats.emitted, 1);
    assert_eq!(stats.buffered, 2);
    assert_eq!(stats.peak_buffered, 2);
    assert_eq!(stats.unmatched_records, 0);
}

#[test]
fn test_stats_are_per_pipeline() {
    let dataset = OxfordPet::new(PetConfig::default());
    let annotations = vec![
        list("trainval.txt", "a_1 1 1 1\nb_1 1 1 1\n"),
        trimap("a_1"),
        trimap("b_1"),
    ];

    let mut full = dataset
        .samples(ok(vec![image("a_1"), image("b_1")]), ok(annotations.clone()))
        .unwrap();
    let mut partial = dataset
        .samples(ok(vec![image("b_1")]), ok(annotations))
        .unwrap();

    while let Some(sample) = full.next() {
        sample.unwrap();
    }
    while let Some(sample) = partial.next() {
        sample.unwrap();
    }

    assert_eq!(full.stats().emitted, 2);
    assert_eq!(full.stats().unmatched_records, 0);
    assert_eq!(partial.stats().emitted, 1);
    assert_eq!(partial.stats().unmatched_records, 1);
    let text = partial.stats().to_prometheus("partial");
    assert!(text.contains("petpipe_pipeline_samples{pipeline=\"partial\"} 1"));
}

#[test]
fn test_drop_reasons_recorded() {
    let filtered_before = ENTRIES_DROPPED.get(DropReason::Filter);
    let unclassified_before = ENTRIES_DROPPED.get(DropReason::Unclassified);

    let dataset = OxfordPet::new(PetConfig::default());
    let samples = collect(
        &dataset,
        vec![RawEntry::new("images/a_1.mat", ""), image("a_1")],
        vec![
            list("trainval.txt", "a_1 1 1 1\n"),
            RawEntry::new("annotations/xmls/a_1.xml", "<annotation/>"),
            trimap("a_1"),
        ],
    );
    assert_eq!(samples.len(), 1);

    // Counters are process-wide; other tests may add to them concurrently
    assert!(ENTRIES_DROPPED.get(DropReason::Filter) > filtered_before);
    assert!(ENTRIES_DROPPED.get(DropReason::Unclassified) > unclassified_before);
}
