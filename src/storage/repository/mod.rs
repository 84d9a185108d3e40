pub mod factor_repo;
pub mod job_repo;

pub use factor_repo::{
    FactorDefinition, FactorDto, FactorRepository, FactorVersionDto, RegisteredFactor,
    ResolvedVersion, SeedEntry,
};
pub use job_repo::{
    ClaimedJob, JobDto, JobRepository, JobRequest, JobStats, JobStatus, JobSummary, SubmittedJob,
    Transition,
};
