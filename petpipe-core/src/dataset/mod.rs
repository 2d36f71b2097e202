//! Oxford-IIIT Pet dataset definition
//!
//! Configuration, category table, decoding and the sample pipeline.

pub mod config;
pub mod categories;
pub mod decode;
pub mod oxford_pet;

pub use config::{PetConfig, Split};
pub use categories::{generate_categories, CATEGORIES};
pub use decode::{decode_image, image_decoder, Decoder, ImageTensor, Payload};
pub use oxford_pet::{
    AnnotationStream, ClassificationRecord, Label, OxfordPet, Sample, Samples, Species,
};
