//! Capability model - named permissions checked at the authorization boundary.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewOwnProfile,
    EditOwnProfile,
    ManageOwnSessions,
    BookAppointments,
    ViewOwnRecords,
    BookLabTests,
    RateDoctors,
    ManageAppointments,
    WriteConsultationNotes,
    WritePrescriptions,
    ViewPatientRecords,
    ViewPatientDirectory,
    RecordVitals,
    ManageLabResults,
    DispensePrescriptions,
    ManageBilling,
    ManageStaff,
    ViewAuditLog,
    ManageUsers,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ViewOwnProfile => "view_own_profile",
            Capability::EditOwnProfile => "edit_own_profile",
            Capability::ManageOwnSessions => "manage_own_sessions",
            Capability::BookAppointments => "book_appointments",
            Capability::ViewOwnRecords => "view_own_records",
            Capability::BookLabTests => "book_lab_tests",
            Capability::RateDoctors => "rate_doctors",
            Capability::ManageAppointments => "manage_appointments",
            Capability::WriteConsultationNotes => "write_consultation_notes",
            Capability::WritePrescriptions => "write_prescriptions",
            Capability::ViewPatientRecords => "view_patient_records",
            Capability::ViewPatientDirectory => "view_patient_directory",
            Capability::RecordVitals => "record_vitals",
            Capability::ManageLabResults => "manage_lab_results",
            Capability::DispensePrescriptions => "dispense_prescriptions",
            Capability::ManageBilling => "manage_billing",
            Capability::ManageStaff => "manage_staff",
            Capability::ViewAuditLog => "view_audit_log",
            Capability::ManageUsers => "manage_users",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
