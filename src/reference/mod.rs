pub mod asset;
pub mod track;

pub use asset::AssetError;
pub use track::ReferenceTrack;
