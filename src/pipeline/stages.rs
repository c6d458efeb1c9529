//! Stage table
//!
//! The pipeline is data-driven: adding, reordering, or marking a stage
//! degradable is a change to this table, not to the orchestrator walk.

use rust_decimal::Decimal;

/// One pipeline stage and its orchestration policy
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub name: &'static str,
    /// Progress reported on successful completion
    pub progress: u8,
    /// Failure degrades to a null output instead of failing the job
    pub degradable: bool,
    /// Known cost estimate checked before the stage runs
    pub pre_estimate: Option<Decimal>,
    /// Enforce the accumulated budget after the stage completes
    pub enforce_after: bool,
}

/// The fixed video-generation stage sequence
pub fn pipeline_stages() -> [StageDescriptor; 6] {
    [
        StageDescriptor {
            name: "audio_parser",
            progress: 10,
            degradable: false,
            pre_estimate: None,
            enforce_after: false,
        },
        StageDescriptor {
            name: "scene_planner",
            progress: 20,
            degradable: false,
            pre_estimate: None,
            enforce_after: false,
        },
        StageDescriptor {
            name: "reference_generator",
            progress: 30,
            degradable: true,
            pre_estimate: Some(Decimal::new(50_00, 2)),
            enforce_after: true,
        },
        StageDescriptor {
            name: "prompt_generator",
            progress: 40,
            degradable: false,
            pre_estimate: None,
            enforce_after: false,
        },
        StageDescriptor {
            name: "video_generator",
            progress: 85,
            degradable: false,
            pre_estimate: Some(Decimal::new(100_00, 2)),
            enforce_after: true,
        },
        StageDescriptor {
            name: "composer",
            progress: 100,
            degradable: false,
            pre_estimate: None,
            enforce_after: false,
        },
    ]
}
