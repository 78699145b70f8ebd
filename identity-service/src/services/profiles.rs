//! Role profile registry: per-role extension records, phone numbers and the
//! staff sub-role.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::auth::LICENSE_TAKEN;
use super::store::{IdentityStore, LICENSE_UNIQUE, PROFILE_EXISTS};
use super::{AuditRecorder, ServiceError};
use crate::dtos::{AddPhoneRequest, UpdateDoctorProfileRequest, UpdatePatientProfileRequest};
use crate::models::phone_number::is_valid_phone_number;
use crate::models::{
    AuditAction, DoctorProfile, PatientProfile, PhoneNumber, Role, RoleProfile, StaffProfile,
    StaffRole, User,
};
use crate::utils::ValidationPipeline;

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct ProfileRegistry {
    store: Arc<dyn IdentityStore>,
    audit: AuditRecorder,
}

impl ProfileRegistry {
    pub fn new(store: Arc<dyn IdentityStore>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    /// Create the profile matching the caller's current role. Exactly once
    /// per (user, kind).
    pub async fn create_profile(&self, user: &User) -> Result<RoleProfile, ServiceError> {
        let profile = match user.role {
            Role::Patient => RoleProfile::Patient(PatientProfile::new(user.user_id)),
            Role::Doctor => RoleProfile::Doctor(DoctorProfile::new(user.user_id, None, None)),
            Role::Staff | Role::Admin => {
                return Err(ServiceError::field(
                    "role",
                    format!("Role '{}' has no profile.", user.role),
                ))
            }
        };

        self.store.insert_profile(&profile).await.map_err(|e| {
            if e.is_unique_violation_of(PROFILE_EXISTS) {
                ServiceError::Conflict("Profile already exists for this user.".to_string())
            } else {
                e.into()
            }
        })?;

        tracing::info!(user_id = %user.user_id, kind = profile.kind().as_str(), "Profile created");
        Ok(profile)
    }

    fn require_role(user: &User, role: Role) -> Result<(), ServiceError> {
        if user.role == role {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "Only users with role '{}' have this profile.",
                role
            )))
        }
    }

    pub async fn get_patient_profile(&self, user: &User) -> Result<PatientProfile, ServiceError> {
        Self::require_role(user, Role::Patient)?;
        self.store
            .find_patient_profile(user.user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Patient profile not found.".to_string()))
    }

    pub async fn update_patient_profile(
        &self,
        user: &User,
        req: UpdatePatientProfileRequest,
    ) -> Result<PatientProfile, ServiceError> {
        ValidationPipeline::of(&req)
            .check(|r, errs| {
                if let Some(history) = &r.medical_history {
                    if !history.is_object() {
                        errs.add("medical_history", "Must be a JSON object.");
                    }
                }
                if let Some(dob) = r.date_of_birth {
                    if dob > Utc::now().date_naive() {
                        errs.add("date_of_birth", "Date of birth cannot be in the future.");
                    }
                }
            })
            .finish()?;

        let mut profile = self.get_patient_profile(user).await?;
        if req.date_of_birth.is_some() {
            profile.date_of_birth = req.date_of_birth;
        }
        if req.gender.is_some() {
            profile.gender = req.gender;
        }
        if req.address.is_some() {
            profile.address = blank_to_none(req.address);
        }
        if let Some(history) = req.medical_history {
            profile.medical_history = history;
        }
        if req.bio.is_some() {
            profile.bio = blank_to_none(req.bio);
        }
        profile.updated_utc = Utc::now();

        self.store.update_patient_profile(&profile).await?;
        self.audit.record(
            Some(user.user_id),
            AuditAction::PatientProfileUpdated,
            json!({ "user_id": user.user_id }),
        );
        Ok(profile)
    }

    pub async fn get_doctor_profile(&self, user: &User) -> Result<DoctorProfile, ServiceError> {
        Self::require_role(user, Role::Doctor)?;
        self.store
            .find_doctor_profile(user.user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Doctor profile not found.".to_string()))
    }

    pub async fn update_doctor_profile(
        &self,
        user: &User,
        req: UpdateDoctorProfileRequest,
    ) -> Result<DoctorProfile, ServiceError> {
        ValidationPipeline::of(&req).finish()?;

        let mut profile = self.get_doctor_profile(user).await?;
        if req.license_number.is_some() {
            profile.license_number = blank_to_none(req.license_number);
        }
        if req.specialty.is_some() {
            profile.specialty = blank_to_none(req.specialty);
        }
        if let Some(years) = req.years_experience {
            profile.years_experience = years;
        }
        if req.hospital_affiliation.is_some() {
            profile.hospital_affiliation = blank_to_none(req.hospital_affiliation);
        }
        if req.bio.is_some() {
            profile.bio = blank_to_none(req.bio);
        }
        profile.updated_utc = Utc::now();

        self.store
            .update_doctor_profile(&profile)
            .await
            .map_err(|e| {
                if e.is_unique_violation_of(LICENSE_UNIQUE) {
                    ServiceError::Conflict(LICENSE_TAKEN.to_string())
                } else {
                    e.into()
                }
            })?;

        self.audit.record(
            Some(user.user_id),
            AuditAction::DoctorProfileUpdated,
            json!({ "user_id": user.user_id }),
        );
        Ok(profile)
    }

    // ==================== Phone numbers ====================

    pub async fn add_phone(
        &self,
        user: &User,
        req: AddPhoneRequest,
    ) -> Result<PhoneNumber, ServiceError> {
        ValidationPipeline::of(&req)
            .check(|r, errs| {
                if !is_valid_phone_number(&r.number) {
                    errs.add("number", "Enter a valid phone number.");
                }
            })
            .finish()?;

        let phone = PhoneNumber::new(user.user_id, &req.number, req.phone_kind, req.is_primary);
        let stored = self.store.insert_phone(&phone).await?;

        tracing::info!(
            user_id = %user.user_id,
            phone_id = %stored.phone_id,
            is_primary = stored.is_primary,
            "Phone number added"
        );
        Ok(stored)
    }

    pub async fn list_phones(&self, user: &User) -> Result<Vec<PhoneNumber>, ServiceError> {
        Ok(self.store.list_phones(user.user_id).await?)
    }

    /// Clear the current primary and set `phone_id` in one step.
    pub async fn set_primary_phone(
        &self,
        user: &User,
        phone_id: Uuid,
    ) -> Result<PhoneNumber, ServiceError> {
        let phone = self
            .store
            .set_primary_phone(user.user_id, phone_id)
            .await
            .map_err(|e| match ServiceError::from(e) {
                ServiceError::NotFound(_) => {
                    ServiceError::NotFound("Phone number not found.".to_string())
                }
                other => other,
            })?;

        self.audit.record(
            Some(user.user_id),
            AuditAction::PrimaryPhoneChanged,
            json!({ "phone_id": phone_id }),
        );
        Ok(phone)
    }

    pub async fn delete_phone(&self, user: &User, phone_id: Uuid) -> Result<(), ServiceError> {
        if !self.store.delete_phone(user.user_id, phone_id).await? {
            return Err(ServiceError::NotFound("Phone number not found.".to_string()));
        }
        tracing::info!(user_id = %user.user_id, phone_id = %phone_id, "Phone number deleted");
        Ok(())
    }

    // ==================== Staff sub-role ====================

    pub async fn get_staff_role(&self, user_id: Uuid) -> Result<Option<StaffRole>, ServiceError> {
        Ok(self
            .store
            .find_staff_profile(user_id)
            .await?
            .map(|p| p.staff_role))
    }

    /// Set (or replace) the user's staff sub-role. Re-applying the same
    /// sub-role changes nothing observable.
    pub async fn assign_staff_role(
        &self,
        actor: &User,
        user_id: Uuid,
        staff_role: StaffRole,
    ) -> Result<StaffProfile, ServiceError> {
        let target = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found.".to_string()))?;

        let previous = self.get_staff_role(target.user_id).await?;
        let profile = self
            .store
            .upsert_staff_profile(target.user_id, staff_role)
            .await?;

        self.audit.record(
            Some(actor.user_id),
            AuditAction::StaffRoleAssigned,
            json!({
                "user_id": target.user_id,
                "staff_role": staff_role.as_str(),
                "previous": previous.map(|r| r.as_str()),
            }),
        );
        Ok(profile)
    }

    /// Remove the staff sub-role and the staff classification together.
    pub async fn remove_staff_role(&self, actor: &User, user_id: Uuid) -> Result<(), ServiceError> {
        if !self.store.delete_staff_profile(user_id).await? {
            return Err(ServiceError::NotFound("User has no staff role.".to_string()));
        }

        self.audit.record(
            Some(actor.user_id),
            AuditAction::StaffRoleRemoved,
            json!({ "user_id": user_id }),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PhoneKind;
    use crate::services::InMemoryStore;

    async fn setup(role: Role) -> (ProfileRegistry, Arc<InMemoryStore>, User) {
        let store = Arc::new(InMemoryStore::new());
        let registry = ProfileRegistry::new(store.clone(), AuditRecorder::new(store.clone()));
        let user = User::new(
            &format!("{}@example.com", Uuid::new_v4()),
            "hash".to_string(),
            "Ana".to_string(),
            "Ruiz".to_string(),
            role,
        );
        store.create_account(&user, None).await.unwrap();
        (registry, store, user)
    }

    fn phone(number: &str, is_primary: bool) -> AddPhoneRequest {
        AddPhoneRequest {
            number: number.to_string(),
            phone_kind: PhoneKind::Mobile,
            is_primary,
        }
    }

    #[tokio::test]
    async fn test_create_profile_exactly_once() {
        let (registry, _, user) = setup(Role::Patient).await;

        registry.create_profile(&user).await.unwrap();
        assert!(matches!(
            registry.create_profile(&user).await,
            Err(ServiceError::Conflict(_))
        ));
        assert!(registry.get_patient_profile(&user).await.is_ok());
    }

    #[tokio::test]
    async fn test_profile_requires_matching_role() {
        let (registry, _, user) = setup(Role::Patient).await;
        registry.create_profile(&user).await.unwrap();

        assert!(matches!(
            registry.get_doctor_profile(&user).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_patch_leaves_missing_fields_alone() {
        let (registry, _, user) = setup(Role::Patient).await;
        registry.create_profile(&user).await.unwrap();

        registry
            .update_patient_profile(
                &user,
                UpdatePatientProfileRequest {
                    address: Some("1 Main St".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let updated = registry
            .update_patient_profile(
                &user,
                UpdatePatientProfileRequest {
                    bio: Some("Runner".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.address.as_deref(), Some("1 Main St"));
        assert_eq!(updated.bio.as_deref(), Some("Runner"));
    }

    #[tokio::test]
    async fn test_medical_history_must_be_object() {
        let (registry, _, user) = setup(Role::Patient).await;
        registry.create_profile(&user).await.unwrap();

        let err = registry
            .update_patient_profile(
                &user,
                UpdatePatientProfileRequest {
                    medical_history: Some(json!(["asthma"])),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        match err {
            ServiceError::Validation(fields) => assert!(fields.contains("medical_history")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_license_collision_on_update_is_conflict() {
        let (registry, store, first) = setup(Role::Doctor).await;
        registry.create_profile(&first).await.unwrap();
        registry
            .update_doctor_profile(
                &first,
                UpdateDoctorProfileRequest {
                    license_number: Some("MD-1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let second = User::new(
            "second@example.com",
            "hash".to_string(),
            "Bo".to_string(),
            "Kim".to_string(),
            Role::Doctor,
        );
        store.create_account(&second, None).await.unwrap();
        registry.create_profile(&second).await.unwrap();

        let err = registry
            .update_doctor_profile(
                &second,
                UpdateDoctorProfileRequest {
                    license_number: Some("MD-1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_phone_primary_moves() {
        let (registry, _, user) = setup(Role::Patient).await;

        let first = registry.add_phone(&user, phone("+15550000001", false)).await.unwrap();
        assert!(first.is_primary);
        let second = registry.add_phone(&user, phone("+15550000002", false)).await.unwrap();
        assert!(!second.is_primary);

        registry.set_primary_phone(&user, second.phone_id).await.unwrap();
        let primaries: Vec<_> = registry
            .list_phones(&user)
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.is_primary)
            .collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].phone_id, second.phone_id);
    }

    #[tokio::test]
    async fn test_invalid_phone_and_unknown_phone() {
        let (registry, _, user) = setup(Role::Patient).await;

        assert!(matches!(
            registry.add_phone(&user, phone("12", false)).await,
            Err(ServiceError::Validation(_))
        ));
        assert!(matches!(
            registry.set_primary_phone(&user, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            registry.delete_phone(&user, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_staff_role_assign_and_remove() {
        let (registry, store, admin) = setup(Role::Admin).await;
        let staff = User::new(
            "staff@example.com",
            "hash".to_string(),
            "Lu".to_string(),
            "Chen".to_string(),
            Role::Staff,
        );
        store.create_account(&staff, None).await.unwrap();

        registry
            .assign_staff_role(&admin, staff.user_id, StaffRole::Nurse)
            .await
            .unwrap();
        registry
            .assign_staff_role(&admin, staff.user_id, StaffRole::Nurse)
            .await
            .unwrap();
        registry
            .assign_staff_role(&admin, staff.user_id, StaffRole::Pharmacist)
            .await
            .unwrap();
        assert_eq!(
            registry.get_staff_role(staff.user_id).await.unwrap(),
            Some(StaffRole::Pharmacist)
        );
        assert!(store.find_user_by_id(staff.user_id).await.unwrap().unwrap().is_staff);

        registry.remove_staff_role(&admin, staff.user_id).await.unwrap();
        assert_eq!(registry.get_staff_role(staff.user_id).await.unwrap(), None);
        assert!(!store.find_user_by_id(staff.user_id).await.unwrap().unwrap().is_staff);
        assert!(matches!(
            registry.remove_staff_role(&admin, staff.user_id).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
