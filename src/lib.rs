//! Atelier Community Service
//!
//! Backend for the Atelier student community: name-based login with optional
//! passwords, a photo feed with reactions and expert feedback, a PDF book
//! catalog, support tickets, and a set of flat content tables (tips, rules,
//! workshops, FAQs, education, products).
//!
//! Every route is a thin pass-through to PostgreSQL and S3-compatible object
//! storage; the service itself holds no durable state beyond the session.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum)                PostgreSQL                 S3 Buckets
//! ┌──────────────┐          ┌──────────────┐          ┌──────────────┐
//! │ Route        │          │ students     │          │ images/      │
//! │ Handlers     │─────────▶│ photos       │          │ books/       │
//! └──────────────┘          │ reactions    │          └──────────────┘
//!        │                  │ feedback     │                 ▲
//!        │                  │ books, ...   │                 │
//!        ▼                  └──────────────┘                 │
//! ┌──────────────┐                 ▲                         │
//! │ Feed         │                 │                         │
//! │ Aggregator   │─────────────────┘                         │
//! └──────────────┘                                           │
//!        │                  ┌──────────────┐                 │
//!        └─────────────────▶│ Object Store │─────────────────┘
//!                           │ Client       │
//!                           └──────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod feed;
pub mod object_store;
pub mod store;

pub use api::{start_api_server, AppState};
pub use config::Config;
pub use error::ApiError;
pub use feed::{FeedAggregator, FeedPhoto};
pub use object_store::ObjectStore;
pub use store::{Book, Photo, ReactionKind, RecordStore, Role, Student};
