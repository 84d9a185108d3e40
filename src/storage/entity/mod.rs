pub mod factor;
pub mod factor_job;
pub mod factor_version;

pub use factor::Entity as Factor;
pub use factor_job::Entity as FactorJob;
pub use factor_version::Entity as FactorVersion;
