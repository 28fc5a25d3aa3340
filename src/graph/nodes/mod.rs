//! 工作流的各个阶段

pub mod background_investigator;
pub mod coder;
pub mod coordinator;
pub mod human_feedback;
pub mod planner;
pub mod reporter;
pub mod research_team;
pub mod researcher;
pub mod step_executor;

pub use background_investigator::BackgroundInvestigatorNode;
pub use coder::CoderNode;
pub use coordinator::CoordinatorNode;
pub use human_feedback::HumanFeedbackNode;
pub use planner::PlannerNode;
pub use reporter::ReporterNode;
pub use research_team::ResearchTeamNode;
pub use researcher::ResearcherNode;
