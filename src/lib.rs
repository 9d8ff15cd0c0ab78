//! # Catalogue Harvester
//!
//! Harvests a hierarchical legal-document catalogue from a JSON API into a
//! local SQLite database whose tables grow new columns as new fields appear.
//!
//! The harvester walks three reference taxonomies (categories, document
//! types, subject catalogue), flattens them into parent-linked rows, and for
//! every catalogue code collects the associated documents together with
//! their full text, citations and related-document edges.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌────────────────┐
//! │   Fetcher   │──▶│  Paginator  │──▶│ Flatten /      │
//! │ HTTP+retry  │   │ multi-call  │   │ Normalize      │
//! └─────────────┘   └─────────────┘   └───────┬────────┘
//!                                             │
//!                                             ▼
//!                                     ┌───────────────┐
//!                                     │  SQLite sink  │
//!                                     │ schema-evolve │
//!                                     └───────┬───────┘
//!                                             │
//!                         ┌───────────────────┤
//!                         ▼                   ▼
//!                   ┌──────────┐        ┌──────────┐
//!                   │  tables  │        │   CSV    │
//!                   │ overview │        │  export  │
//!                   └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest refs                       # reference taxonomies
//! harvest collection 196567          # one catalogue code
//! harvest run --max-codes 3          # everything, bounded
//! harvest tables                     # what is in the database
//! harvest export details             # write output/details.csv
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`errors`] | Typed errors per pipeline stage |
//! | [`models`] | Core data types |
//! | [`fetch`] | Transport seam and retry policy |
//! | [`api`] | Endpoint URLs and response parsing |
//! | [`paginate`] | Multi-call resource assembly |
//! | [`flatten`] | Taxonomy tree flattening |
//! | [`normalize`] | Nested-value serialization and camelCase columns |
//! | [`db`] | Database connection |
//! | [`sink`] | Schema-evolving table writer |
//! | [`harvest`] | Orchestration of a full run |
//! | [`export`] | CSV export |
//! | [`stats`] | Database overview |

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod export;
pub mod fetch;
pub mod flatten;
pub mod harvest;
pub mod models;
pub mod normalize;
pub mod paginate;
pub mod sink;
pub mod stats;
