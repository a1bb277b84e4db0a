pub mod filesystem;
pub mod recording;

pub use recording::{
    thumbnail_file_name, AssetLocators, RecordingAssets, RecordingAttributes, RecordingMetadata,
    RecordingStore,
};
