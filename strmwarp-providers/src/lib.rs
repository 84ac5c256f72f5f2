// strmwarp provider clients
//
// Pure HTTP clients for the two collaborators the proxy consults:
// - emby: Emby/Jellyfin item directory (item path + media sources)
// - alist: Alist storage gateway (object size, raw URL, signature)
//
// Each client also implements a narrow async trait so the proxy core can be
// exercised against in-memory fakes.

// Shared error types
pub mod error;

pub mod alist;
pub mod emby;

pub use alist::error::AlistError;
pub use alist::{AlistClient, FsObject, StorageGateway};
pub use emby::error::EmbyError;
pub use emby::{BaseItem, EmbyClient, ItemDirectory, ItemsResponse, MediaProtocol, MediaSourceInfo};
pub use error::ProviderClientError;
