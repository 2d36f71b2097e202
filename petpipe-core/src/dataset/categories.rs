//! Category table
//!
//! The fixed breed table, index-aligned to `label - 1`, and the offline step
//! that regenerates it from the annotation archive.

use std::collections::BTreeSet;

use super::config::Split;
use super::oxford_pet::{classify_annotation, AnnotationStream};
use crate::datapipe::{LineRecords, RawEntry};
use crate::error::{PetError, Result};

/// Breed names in label order
pub const CATEGORIES: [&str; 37] = [
    "Abyssinian",
    "American Bulldog",
    "American Pit Bull Terrier",
    "Basset Hound",
    "Beagle",
    "Bengal",
    "Birman",
    "Bombay",
    "Boxer",
    "British Shorthair",
    "Chihuahua",
    "Egyptian Mau",
    "English Cocker Spaniel",
    "English Setter",
    "German Shorthaired",
    "Great Pyrenees",
    "Havanese",
    "Japanese Chin",
    "Keeshond",
    "Leonberger",
    "Maine Coon",
    "Miniature Pinscher",
    "Newfoundland",
    "Persian",
    "Pomeranian",
    "Pug",
    "Ragdoll",
    "Russian Blue",
    "Saint Bernard",
    "Samoyed",
    "Scottish Terrier",
    "Shiba Inu",
    "Siamese",
    "Sphynx",
    "Staffordshire Bull Terrier",
    "Wheaten Terrier",
    "Yorkshire Terrier",
];

/// The fixed table as owned strings
pub fn default_categories() -> Vec<String> {
    CATEGORIES.iter().map(|c| c.to_string()).collect()
}

/// Uppercase the first letter of every alphabetic run, lowercase the rest
fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut prev_alpha = false;
    for c in word.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

/// `american_pit_bull_terrier` -> `American Pit Bull Terrier`
pub fn category_name(raw: &str) -> String {
    raw.split('_').map(title_case).collect::<Vec<_>>().join(" ")
}

/// Rebuild the category table from raw annotation-archive entries.
///
/// Reads the `split` classification list, takes the image-id prefix before
/// the trailing `_<n>` as the raw breed name, orders breeds by label and
/// formats them with [`category_name`].
pub fn generate_categories<I>(annotations: I, split: Split) -> Result<Vec<String>>
where
    I: IntoIterator<Item = Result<RawEntry>>,
{
    let list_file = split.list_file();
    let lists = annotations.into_iter().filter(|item| match item {
        Ok(entry) => {
            classify_annotation(entry) == Some(AnnotationStream::Classification)
                && entry.name() == list_file
        }
        Err(_) => true,
    });

    let mut raw: BTreeSet<(i64, String)> = BTreeSet::new();
    for record in LineRecords::new(lists) {
        let record = record?;
        if record.fields.len() < 2 {
            return Err(PetError::MalformedLine {
                path: record.path,
                line: record.line,
                expected: 2,
                found: record.fields.len(),
            });
        }
        let image_id = &record.fields[0];
        let label: i64 = record.fields[1].parse().map_err(|_| PetError::InvalidLabel {
            image_id: image_id.clone(),
            value: record.fields[1].clone(),
        })?;
        let prefix = image_id
            .rsplit_once('_')
            .map(|(prefix, _)| prefix)
            .unwrap_or(image_id);
        raw.insert((label, prefix.to_string()));
    }

    Ok(raw.into_iter().map(|(_, prefix)| category_name(&prefix)).collect())
}
