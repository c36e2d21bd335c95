pub mod material;
pub mod mesh;
pub mod object;
pub mod texture;

pub use material::{MaterialOwnership, WorkingMaterial};
pub use mesh::{MAX_UV_CHANNELS, SourceAsset, WorkingMesh};
pub use object::{BuildGroup, WorkingObject};
pub use texture::{PixelFormat, SharedTexture, TextureId, WorkingTexture};
