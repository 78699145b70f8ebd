pub mod audit_event;
pub mod capability;
pub mod phone_number;
pub mod profile;
pub mod refresh_session;
pub mod user;
pub mod verification_token;

pub use audit_event::{AuditAction, AuditEvent, AuditEventResponse};
pub use capability::Capability;
pub use phone_number::{PhoneKind, PhoneNumber};
pub use profile::{
    DoctorProfile, Gender, PatientProfile, ProfileKind, RoleProfile, StaffProfile, StaffRole,
};
pub use refresh_session::{RefreshSession, SessionInfo};
pub use user::{normalize_email, Role, User, UserResponse};
pub use verification_token::{TokenEffect, TokenKind, VerificationToken};
