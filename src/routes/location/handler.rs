use axum::extract::{Json, State};

use crate::AppState;
use crate::error::AppError;
use crate::utils::{calculate_distance_km, epoch_millis, valid_coordinate};

use super::model::{
    DistanceRequest, DistanceResponse, HistoryEntry, HistoryRequest, HistoryResponse,
    LocationPoint, PersonLastSeen, PersonLocation, RegisterLocationRequest,
    RegisterLocationResponse, connect_cache,
};

#[axum::debug_handler]
pub async fn register_location(
    State(state): State<AppState>,
    Json(req): Json<RegisterLocationRequest>,
) -> Result<Json<RegisterLocationResponse>, AppError> {
    // 坐标校验失败时直接拒绝，不落库
    if !valid_coordinate(req.latitude) || !valid_coordinate(req.longitude) {
        return Err(AppError::InvalidCoordinates);
    }

    let mut cache = connect_cache(&state.redis).await;
    let last_seen = epoch_millis();

    let location = PersonLocation::upsert(
        &state.pool,
        &req.person_id,
        req.latitude,
        req.longitude,
        last_seen,
    )
    .await?;

    HistoryEntry::append(
        &state.pool,
        &location.person_id,
        location.latitude,
        location.longitude,
        last_seen,
    )
    .await?;

    location.mirror_to_cache(&mut cache).await;

    Ok(Json(RegisterLocationResponse { last_seen }))
}

#[axum::debug_handler]
pub async fn location_history(
    State(state): State<AppState>,
    Json(req): Json<HistoryRequest>,
) -> Result<Json<HistoryResponse>, AppError> {
    // 未注册的人直接404
    if PersonLocation::find_by_person(&state.pool, &req.person_id)
        .await?
        .is_none()
    {
        return Err(AppError::PersonNotFound(req.person_id));
    }

    let entries =
        HistoryEntry::find_in_range(&state.pool, &req.person_id, &req.start_time, &req.end_time)
            .await?;
    let locations = entries
        .into_iter()
        .map(LocationPoint::from)
        .collect::<Vec<_>>();

    Ok(Json(HistoryResponse {
        person_id: req.person_id,
        locations,
    }))
}

#[axum::debug_handler]
pub async fn distance_between(
    State(state): State<AppState>,
    Json(req): Json<DistanceRequest>,
) -> Result<Json<DistanceResponse>, AppError> {
    let mut cache = connect_cache(&state.redis).await;

    let first = PersonLocation::resolve(&state.pool, &mut cache, &req.person_id_1).await?;
    let second = PersonLocation::resolve(&state.pool, &mut cache, &req.person_id_2).await?;

    // 任何一方没有位置记录时距离按0处理，不算错误
    let distance = match (&first, &second) {
        (Some(a), Some(b)) => {
            calculate_distance_km(a.latitude, a.longitude, b.latitude, b.longitude)
        }
        _ => 0.0,
    };

    Ok(Json(DistanceResponse {
        distance: format!("{}", distance),
        unit: "KM".to_string(),
        last_seen: vec![
            PersonLastSeen {
                person: req.person_id_1,
                last_seen: first.map(|loc| loc.last_seen),
            },
            PersonLastSeen {
                person: req.person_id_2,
                last_seen: second.map(|loc| loc.last_seen),
            },
        ],
    }))
}
