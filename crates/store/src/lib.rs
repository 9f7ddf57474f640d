//! Content-addressed blob store.
//!
//! One cache of immutable file blobs, shared by every project on the
//! machine. A blob is identified solely by its integrity digest; the
//! digest-to-path function is stable so the overlay can point read-only
//! opens directly at cached files.

mod error;
mod store;

pub use error::StoreError;
pub use store::BlobStore;
