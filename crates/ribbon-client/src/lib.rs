//! # ribbon-client
//!
//! Recipient and issuer workflows on top of the relay engine: merging an
//! accepted badge into the displayed set, the acceptance state machine with
//! backup recovery, and publishing definitions and awards.

pub mod error;
pub mod issuer;
pub mod merge;
pub mod workflow;

pub use error::{AcceptError, IssueError, MergeError};
pub use issuer::{
    award, award_record, publish_definition_if_missing, AwardResult, BadgeDefinition,
    DefinitionStatus,
};
pub use merge::{MergeEngine, MergeOutcome};
pub use workflow::{AcceptOutcome, AcceptReport, AcceptState, AcceptanceWorkflow, WorkflowConfig};
