use axum::Json;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    InvalidCoordinates,
    PersonNotFound(String),
    DuplicateLocation,
    Database(sqlx::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    code: i32,
    error_message: String,
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        // 历史表主键冲突映射为重复写入
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return AppError::DuplicateLocation;
            }
        }
        AppError::Database(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InvalidCoordinates => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid location coordinates".to_string(),
            ),
            AppError::PersonNotFound(person) => {
                (StatusCode::NOT_FOUND, format!("User not found: {}", person))
            }
            AppError::DuplicateLocation => (
                StatusCode::CONFLICT,
                "duplicate location entry".to_string(),
            ),
            AppError::Database(e) => (StatusCode::BAD_REQUEST, e.to_string()),
        };

        let body = Json(ErrorResponse {
            code: status.as_u16() as i32,
            error_message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_coordinates_maps_to_422() {
        let resp = AppError::InvalidCoordinates.into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn person_not_found_maps_to_404() {
        let resp = AppError::PersonNotFound("p1".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn duplicate_location_maps_to_409() {
        let resp = AppError::DuplicateLocation.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn other_store_errors_map_to_400() {
        let resp = AppError::Database(sqlx::Error::RowNotFound).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn non_database_sqlx_errors_stay_generic() {
        let err = AppError::from(sqlx::Error::PoolClosed);
        assert!(matches!(err, AppError::Database(_)));
    }
}
