//! # Event Gallery
//!
//! Progressive loading and bulk download of remotely-hosted event photo
//! collections. Image metadata lives in a record store; image bytes live in
//! one of two origin backends. Nothing is stored locally except the files a
//! user explicitly downloads.
//!
//! # Architecture
//!
//! ```text
//!  record store ──▶ ImageRecord ──▶ UrlResolver ──▶ thumb / medium / large / original
//!                                        │
//!            ┌───────────────────────────┼───────────────────────────┐
//!            ▼                           ▼                           ▼
//!      VisibleWindow               Lightbox (large)          Exporters (original)
//!   (progressive grid)        next/prev + neighbour warm     single file / zip archive
//! ```
//!
//! Every consumer goes through URL resolution, so neither the window, the
//! lightbox nor the exporters know which backend a record came from.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`types`] | Record store rows (`ImageRecord`, `CollectionMeta`) and the tagged `ImageSource` |
//! | [`urls`] | Resolution of the four delivery URLs per record, hero and cover selection |
//! | [`naming`] | Download filenames, archive entry names, display titles |
//! | [`window`] | Visible-window state machine and sentinel subscriptions |
//! | [`lightbox`] | Circular navigation, key and click handling, neighbour prefetch |
//! | [`fetch`] | The `Fetcher` seam and its `reqwest` implementation |
//! | [`export`] | Single-image and bulk zip export through transient local files |
//! | [`store`] | Record store queries and the `Gallery` view states |
//! | [`config`] | `config.toml` loading, stock defaults, merging, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Two Origins, One Resolver
//!
//! The collection was migrated from object storage with an on-demand render
//! endpoint to a CDN with pre-computed transformations, and both kinds of
//! record coexist. Rows are classified once into [`types::ImageSource`] and
//! [`urls::UrlResolver`] dispatches on the variant. A record with neither
//! shape is rejected with [`urls::InvalidImageRecordError`] instead of
//! producing a malformed URL, and so is a record whose origin base is left
//! unconfigured ([`urls::ResolveError::OriginNotConfigured`]).
//!
//! ## Batch Growth, Not Virtualization
//!
//! Galleries hold hundreds of photos. The grid realizes a prefix and grows it
//! by a fixed increment whenever the sentinel after the last image nears the
//! viewport. Realized images stay realized, which keeps scroll position and
//! layout stable at the cost of off-screen memory.
//!
//! ## Overlapping Fetches, Ordered Archives
//!
//! Bulk export fetches with bounded concurrency but writes entries in
//! collection order. A failing image is skipped and counted; only archive
//! serialization failures abort the batch.
//!
//! ## No Global Client
//!
//! The HTTP client, record store and fetchers are built once in `main` and
//! passed in. Library code never reads the environment except through
//! [`config::load_config`].

pub mod config;
pub mod export;
pub mod fetch;
pub mod lightbox;
pub mod naming;
pub mod output;
pub mod store;
pub mod types;
pub mod urls;
pub mod window;

#[cfg(test)]
pub(crate) mod test_helpers;
