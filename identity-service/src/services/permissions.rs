//! Permission resolver. Capabilities are derived, never stored.

use std::collections::BTreeSet;

use crate::models::{Capability, Role, StaffRole, User};

use crate::models::Capability::*;

const BASELINE: &[Capability] = &[ViewOwnProfile, EditOwnProfile, ManageOwnSessions];

fn role_capabilities(role: Role) -> &'static [Capability] {
    match role {
        Role::Patient => &[BookAppointments, ViewOwnRecords, BookLabTests, RateDoctors],
        Role::Doctor => &[
            ManageAppointments,
            WriteConsultationNotes,
            WritePrescriptions,
            ViewPatientRecords,
        ],
        Role::Staff => &[],
        Role::Admin => &[
            ManageStaff,
            ViewAuditLog,
            ManageAppointments,
            ManageBilling,
            ViewPatientDirectory,
        ],
    }
}

fn staff_capabilities(staff_role: StaffRole) -> &'static [Capability] {
    match staff_role {
        StaffRole::Receptionist => &[ManageAppointments, ViewPatientDirectory],
        StaffRole::Nurse => &[ViewPatientRecords, RecordVitals],
        StaffRole::LabTechnician => &[ManageLabResults],
        StaffRole::Pharmacist => &[DispensePrescriptions],
        StaffRole::BillingClerk => &[ManageBilling],
        StaffRole::Manager => &[
            ViewPatientDirectory,
            ManageAppointments,
            ManageBilling,
            ManageStaff,
        ],
    }
}

/// Effective capabilities of `user`, given its staff sub-role if it has one.
///
/// Users who cannot authenticate get nothing. The sub-role only counts while
/// the user is in the staff class.
pub fn capabilities_for(user: &User, staff_role: Option<StaffRole>) -> BTreeSet<Capability> {
    if !user.can_authenticate() {
        return BTreeSet::new();
    }

    let mut caps: BTreeSet<Capability> = BASELINE.iter().copied().collect();
    caps.extend(role_capabilities(user.role).iter().copied());

    if user.is_staff {
        if let Some(staff_role) = staff_role {
            caps.extend(staff_capabilities(staff_role).iter().copied());
        }
    }

    if user.is_superuser {
        caps.insert(ManageUsers);
    }

    caps
}

pub fn has_capability(user: &User, staff_role: Option<StaffRole>, capability: Capability) -> bool {
    capabilities_for(user, staff_role).contains(&capability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role: Role) -> User {
        User::new(
            "u@example.com",
            "hash".to_string(),
            "U".to_string(),
            "Ser".to_string(),
            role,
        )
    }

    #[test]
    fn test_patient_capabilities() {
        let caps = capabilities_for(&user(Role::Patient), None);
        assert!(caps.contains(&BookAppointments));
        assert!(caps.contains(&ViewOwnProfile));
        assert!(!caps.contains(&WritePrescriptions));
        assert!(!caps.contains(&ManageUsers));
    }

    #[test]
    fn test_staff_sub_role_replaces_rather_than_accumulates() {
        let mut staff = user(Role::Staff);
        staff.is_staff = true;

        let nurse = capabilities_for(&staff, Some(StaffRole::Nurse));
        assert!(nurse.contains(&RecordVitals));

        let pharmacist = capabilities_for(&staff, Some(StaffRole::Pharmacist));
        assert!(pharmacist.contains(&DispensePrescriptions));
        assert!(!pharmacist.contains(&RecordVitals));
    }

    #[test]
    fn test_sub_role_ignored_outside_staff_class() {
        let patient = user(Role::Patient);
        let caps = capabilities_for(&patient, Some(StaffRole::Manager));
        assert!(!caps.contains(&ManageStaff));
    }

    #[test]
    fn test_superuser_gains_manage_users() {
        let mut admin = user(Role::Admin);
        admin.is_superuser = true;
        assert!(has_capability(&admin, None, ManageUsers));
        assert!(has_capability(&admin, None, ViewAuditLog));
    }

    #[test]
    fn test_inactive_or_deleted_users_have_nothing() {
        let mut admin = user(Role::Admin);
        admin.is_superuser = true;
        admin.deleted_utc = Some(Utc::now());
        assert!(capabilities_for(&admin, None).is_empty());

        let mut doctor = user(Role::Doctor);
        doctor.is_active = false;
        assert!(capabilities_for(&doctor, None).is_empty());
    }
}
