pub mod cert;
pub mod registration;

pub use cert::{CertificatePaths, ManagementCertificate};
pub use registration::register;
