//! Self-service endpoints under `/users/me`.

use service_core::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    dtos::{
        AddPhoneRequest, ErrorResponse, MeResponse, MessageResponse, UpdateDoctorProfileRequest,
        UpdatePatientProfileRequest,
    },
    middleware::AuthContext,
    models::{Capability, DoctorProfile, PatientProfile, PhoneNumber},
    services::ServiceError,
    utils::JsonBody,
    AppState,
};

/// Current user with effective capabilities
#[utoipa::path(
    get,
    path = "/users/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Account",
    security(("bearer_auth" = []))
)]
pub async fn get_me(ctx: AuthContext) -> Json<MeResponse> {
    let capabilities = ctx.capabilities().into_iter().collect();
    Json(MeResponse {
        user: ctx.user.sanitized(),
        staff_role: ctx.staff_role,
        capabilities,
    })
}

/// Create the profile for the caller's current role
#[utoipa::path(
    post,
    path = "/users/me/profile",
    responses(
        (status = 201, description = "Patient or doctor profile, tagged by `kind`"),
        (status = 400, description = "Role has no profile", body = ErrorResponse),
        (status = 409, description = "Profile already exists", body = ErrorResponse)
    ),
    tag = "Profiles",
    security(("bearer_auth" = []))
)]
pub async fn create_profile(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require(Capability::EditOwnProfile)?;
    let profile = state.profile_registry.create_profile(&ctx.user).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

#[utoipa::path(
    get,
    path = "/users/me/profile/patient",
    responses(
        (status = 200, description = "Patient profile", body = PatientProfile),
        (status = 403, description = "Caller is not a patient", body = ErrorResponse),
        (status = 404, description = "Profile not created yet", body = ErrorResponse)
    ),
    tag = "Profiles",
    security(("bearer_auth" = []))
)]
pub async fn get_patient_profile(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<PatientProfile>, ServiceError> {
    Ok(Json(
        state.profile_registry.get_patient_profile(&ctx.user).await?,
    ))
}

/// Partially update the patient profile
#[utoipa::path(
    patch,
    path = "/users/me/profile/patient",
    request_body = UpdatePatientProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = PatientProfile),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 403, description = "Caller is not a patient", body = ErrorResponse)
    ),
    tag = "Profiles",
    security(("bearer_auth" = []))
)]
pub async fn update_patient_profile(
    State(state): State<AppState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<UpdatePatientProfileRequest>,
) -> Result<Json<PatientProfile>, ServiceError> {
    ctx.require(Capability::EditOwnProfile)?;
    Ok(Json(
        state
            .profile_registry
            .update_patient_profile(&ctx.user, req)
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/users/me/profile/doctor",
    responses(
        (status = 200, description = "Doctor profile", body = DoctorProfile),
        (status = 403, description = "Caller is not a doctor", body = ErrorResponse),
        (status = 404, description = "Profile not created yet", body = ErrorResponse)
    ),
    tag = "Profiles",
    security(("bearer_auth" = []))
)]
pub async fn get_doctor_profile(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<DoctorProfile>, ServiceError> {
    Ok(Json(
        state.profile_registry.get_doctor_profile(&ctx.user).await?,
    ))
}

/// Partially update the doctor profile
#[utoipa::path(
    patch,
    path = "/users/me/profile/doctor",
    request_body = UpdateDoctorProfileRequest,
    responses(
        (status = 200, description = "Updated profile", body = DoctorProfile),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 403, description = "Caller is not a doctor", body = ErrorResponse),
        (status = 409, description = "License number already registered", body = ErrorResponse)
    ),
    tag = "Profiles",
    security(("bearer_auth" = []))
)]
pub async fn update_doctor_profile(
    State(state): State<AppState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<UpdateDoctorProfileRequest>,
) -> Result<Json<DoctorProfile>, ServiceError> {
    ctx.require(Capability::EditOwnProfile)?;
    Ok(Json(
        state
            .profile_registry
            .update_doctor_profile(&ctx.user, req)
            .await?,
    ))
}

// ==================== Phone numbers ====================

#[utoipa::path(
    get,
    path = "/users/me/phones",
    responses(
        (status = 200, description = "Phone numbers, primary first", body = [PhoneNumber])
    ),
    tag = "Profiles",
    security(("bearer_auth" = []))
)]
pub async fn list_phones(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Vec<PhoneNumber>>, ServiceError> {
    Ok(Json(state.profile_registry.list_phones(&ctx.user).await?))
}

#[utoipa::path(
    post,
    path = "/users/me/phones",
    request_body = AddPhoneRequest,
    responses(
        (status = 201, description = "Phone number added", body = PhoneNumber),
        (status = 400, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Profiles",
    security(("bearer_auth" = []))
)]
pub async fn add_phone(
    State(state): State<AppState>,
    ctx: AuthContext,
    JsonBody(req): JsonBody<AddPhoneRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    ctx.require(Capability::EditOwnProfile)?;
    let phone = state.profile_registry.add_phone(&ctx.user, req).await?;
    Ok((StatusCode::CREATED, Json(phone)))
}

/// Make a phone number the primary one
#[utoipa::path(
    post,
    path = "/users/me/phones/{phone_id}/primary",
    params(
        ("phone_id" = Uuid, Path, description = "Phone number ID")
    ),
    responses(
        (status = 200, description = "Phone number is now primary", body = PhoneNumber),
        (status = 404, description = "Phone number not found", body = ErrorResponse)
    ),
    tag = "Profiles",
    security(("bearer_auth" = []))
)]
pub async fn set_primary_phone(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(phone_id): Path<Uuid>,
) -> Result<Json<PhoneNumber>, ServiceError> {
    ctx.require(Capability::EditOwnProfile)?;
    Ok(Json(
        state
            .profile_registry
            .set_primary_phone(&ctx.user, phone_id)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/users/me/phones/{phone_id}",
    params(
        ("phone_id" = Uuid, Path, description = "Phone number ID")
    ),
    responses(
        (status = 200, description = "Phone number deleted", body = MessageResponse),
        (status = 404, description = "Phone number not found", body = ErrorResponse)
    ),
    tag = "Profiles",
    security(("bearer_auth" = []))
)]
pub async fn delete_phone(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(phone_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ServiceError> {
    ctx.require(Capability::EditOwnProfile)?;
    state
        .profile_registry
        .delete_phone(&ctx.user, phone_id)
        .await?;
    Ok(Json(MessageResponse::new("Phone number deleted.")))
}
