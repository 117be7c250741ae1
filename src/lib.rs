//! # Genesis Interlinear
//!
//! Hebrew/English interlinear chunking, verse reconciliation, and
//! verse-seeded semantic search for the book of Genesis.
//!
//! The verse table is flattened per language into one text with per-verse
//! character boundaries. A text splitter cuts that text into overlapping
//! chunks, and each chunk is reconciled back to the verses it covers: full
//! verses, partial verses (with a word count), the aligned text in the other
//! language, and Strong's tags. The resulting records are written as JSON,
//! embedded into SQLite, and served over a small HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌────────────┐   ┌──────────┐
//! │ VerseTable │──▶│ Splitter │──▶│ Reconciler │──▶│ records/ │
//! │ (flatten)  │   │          │   │            │   │  *.json  │
//! └────────────┘   └──────────┘   └────────────┘   └────┬─────┘
//!                                                       │ gx index
//!                                                       ▼
//!                                 ┌──────────┐    ┌──────────┐
//!                                 │ gx search│◀───│  SQLite  │
//!                                 │ gx serve │    │ +vectors │
//!                                 └──────────┘    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! gx chunk                                  # build agentic_<model>_records.json
//! gx verify                                 # check persisted records
//! gx init                                   # create database
//! gx index --model berit --level agentic_berit
//! gx search --model berit --level agentic_berit "Gen 1:1-3"
//! gx serve                                  # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Verse keys, boundaries, verse references, chunk records |
//! | [`corpus`] | Verse table loading and per-language flattening |
//! | [`splitter`] | Character and sentence splitters, chunk offsets |
//! | [`reconcile`] | Chunk-to-verse reconciliation |
//! | [`records`] | Record levels and JSON persistence |
//! | [`build`] | `gx chunk` pipeline |
//! | [`verify`] | Consistency checks over persisted records |
//! | [`progress`] | Build progress reporting |
//! | [`embedding`] | Embedding providers |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`store`] | Record and vector rows |
//! | [`index`] | `gx index` pipeline |
//! | [`verse_ref`] | Verse reference parsing for queries |
//! | [`search`] | Verse-seeded semantic search |
//! | [`server`] | HTTP server |

pub mod build;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod index;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod reconcile;
pub mod records;
pub mod search;
pub mod server;
pub mod splitter;
pub mod store;
pub mod verify;
pub mod verse_ref;
