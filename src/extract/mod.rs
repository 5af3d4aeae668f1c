//! Extraction stage: one source document in, one validated entity out.
//!
//! Both extractors follow the same contract. Empty input fails before any
//! call is made; the call runs at the configured extraction temperature with
//! grounding-only instructions; the reply must pass the schema gate on the
//! first attempt.

pub mod general;
pub mod thermal;

pub use general::extract_general;
pub use thermal::extract_thermal;
