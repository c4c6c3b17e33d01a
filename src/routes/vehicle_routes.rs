//! Rutas de la API de vehículos

use axum::{
    extract::{Path, Query, State},
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};

use crate::controllers::vehicle_controller::VehicleController;
use crate::controllers::vehicle_delete_controller::VehicleDeleteController;
use crate::dto::vehicle_dto::{
    DeleteDataForVinsResponse, DisconnectDataForVinsResponse, MintDataForVinsResponse,
    RegisterVehicleRequest, StatusForVinsResponse, SubmitDeleteDataRequest,
    SubmitDisconnectDataRequest, SubmitMintDataRequest, SubmitVinVerificationRequest,
    VehicleResponse, VehiclesResponse, VinsQuery,
};
use crate::middleware::auth_middleware::{auth_middleware, AuthenticatedUser};
use crate::state::AppState;
use crate::utils::errors::AppError;
use crate::utils::validation::parse_vins_param;

pub fn create_vehicle_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/vehicles", get(get_vehicles))
        .route("/v1/vehicle/register", post(register_vehicle))
        .route(
            "/v1/vehicle/verify",
            get(get_verification_status).post(submit_verification),
        )
        .route("/v1/vehicle/mint/status", get(get_mint_status))
        .route("/v1/vehicle/mint", get(get_mint_data).post(submit_mint))
        .route("/v1/vehicle/disconnect/status", get(get_disconnect_status))
        .route(
            "/v1/vehicle/disconnect",
            get(get_disconnect_data).post(submit_disconnect),
        )
        .route("/v1/vehicle/delete/status", get(get_delete_status))
        .route(
            "/v1/vehicle/delete",
            get(get_delete_data).post(submit_delete),
        )
        .route("/v1/vehicle/:external_id", get(get_vehicle_by_external_id))
        .layer(middleware::from_fn_with_state(state, auth_middleware))
}

async fn get_vehicles(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<VehiclesResponse>, AppError> {
    let controller = VehicleController::new(state);
    let response = controller.get_vehicles(&user.wallet_address).await?;
    Ok(Json(response))
}

async fn get_vehicle_by_external_id(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(external_id): Path<String>,
) -> Result<Json<VehicleResponse>, AppError> {
    let controller = VehicleController::new(state);
    let response = controller
        .get_vehicle_by_external_id(&user.wallet_address, &external_id)
        .await?;
    Ok(Json(response))
}

async fn register_vehicle(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<RegisterVehicleRequest>,
) -> Result<Json<VehicleResponse>, AppError> {
    let controller = VehicleController::new(state);
    let response = controller
        .register_vehicle(&user.wallet_address, request)
        .await?;
    Ok(Json(response))
}

async fn get_verification_status(
    State(state): State<AppState>,
    Query(query): Query<VinsQuery>,
) -> Result<Json<StatusForVinsResponse>, AppError> {
    let controller = VehicleController::new(state);
    let response = controller
        .get_verification_status(&parse_vins_param(&query.vins))
        .await?;
    Ok(Json(response))
}

async fn submit_verification(
    State(state): State<AppState>,
    Json(request): Json<SubmitVinVerificationRequest>,
) -> Result<Json<StatusForVinsResponse>, AppError> {
    let controller = VehicleController::new(state);
    let response = controller.submit_verification(request).await?;
    Ok(Json(response))
}

async fn get_mint_data(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<VinsQuery>,
) -> Result<Json<MintDataForVinsResponse>, AppError> {
    let controller = VehicleController::new(state);
    let response = controller
        .get_mint_data(&user.wallet_address, &parse_vins_param(&query.vins))
        .await?;
    Ok(Json(response))
}

async fn submit_mint(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<SubmitMintDataRequest>,
) -> Result<Json<StatusForVinsResponse>, AppError> {
    let controller = VehicleController::new(state);
    let response = controller.submit_mint(&user.wallet_address, request).await?;
    Ok(Json(response))
}

async fn get_mint_status(
    State(state): State<AppState>,
    Query(query): Query<VinsQuery>,
) -> Result<Json<StatusForVinsResponse>, AppError> {
    let controller = VehicleController::new(state);
    let response = controller
        .get_mint_status(&parse_vins_param(&query.vins))
        .await?;
    Ok(Json(response))
}

async fn get_disconnect_data(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<VinsQuery>,
) -> Result<Json<DisconnectDataForVinsResponse>, AppError> {
    let controller = VehicleDeleteController::new(state);
    let response = controller
        .get_disconnect_data(&user.wallet_address, &parse_vins_param(&query.vins))
        .await?;
    Ok(Json(response))
}

async fn submit_disconnect(
    State(state): State<AppState>,
    Json(request): Json<SubmitDisconnectDataRequest>,
) -> Result<Json<StatusForVinsResponse>, AppError> {
    let controller = VehicleDeleteController::new(state);
    let response = controller.submit_disconnect(request).await?;
    Ok(Json(response))
}

async fn get_disconnect_status(
    State(state): State<AppState>,
    Query(query): Query<VinsQuery>,
) -> Result<Json<StatusForVinsResponse>, AppError> {
    let controller = VehicleDeleteController::new(state);
    let response = controller
        .get_disconnect_status(&parse_vins_param(&query.vins))
        .await?;
    Ok(Json(response))
}

async fn get_delete_status(
    State(state): State<AppState>,
    Query(query): Query<VinsQuery>,
) -> Result<Json<StatusForVinsResponse>, AppError> {
    let controller = VehicleDeleteController::new(state);
    let response = controller
        .get_delete_status(&parse_vins_param(&query.vins))
        .await?;
    Ok(Json(response))
}

async fn get_delete_data(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<VinsQuery>,
) -> Result<Json<DeleteDataForVinsResponse>, AppError> {
    let controller = VehicleDeleteController::new(state);
    let response = controller
        .get_delete_data(&user.wallet_address, &parse_vins_param(&query.vins))
        .await?;
    Ok(Json(response))
}

async fn submit_delete(
    State(state): State<AppState>,
    Json(request): Json<SubmitDeleteDataRequest>,
) -> Result<Json<StatusForVinsResponse>, AppError> {
    let controller = VehicleDeleteController::new(state);
    let response = controller.submit_delete(request).await?;
    Ok(Json(response))
}
