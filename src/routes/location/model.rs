use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient, aio::MultiplexedConnection};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

// 缓存相关常量
const LOCATION_CACHE_EXPIRE: u64 = 600; // 最新位置缓存过期时间，单位秒
const LOCATION_CACHE_PREFIX: &str = "person:loc:"; // 最新位置缓存前缀

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersonLocation {
    pub person_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_seen: i64,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryEntry {
    pub person_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_seen: i64,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterLocationRequest {
    // 注册接口历史遗留的驼峰字段，其余接口都是下划线
    #[serde(rename = "personId")]
    pub person_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Serialize)]
pub struct RegisterLocationResponse {
    pub last_seen: i64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryRequest {
    pub person_id: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Serialize)]
pub struct LocationPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub person_id: String,
    pub locations: Vec<LocationPoint>,
}

#[derive(Debug, Deserialize)]
pub struct DistanceRequest {
    pub person_id_1: String,
    pub person_id_2: String,
}

#[derive(Debug, Serialize)]
pub struct PersonLastSeen {
    pub person: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DistanceResponse {
    pub distance: String,
    pub unit: String,
    pub last_seen: Vec<PersonLastSeen>,
}

impl From<HistoryEntry> for LocationPoint {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            latitude: entry.latitude,
            longitude: entry.longitude,
            // 历史记录以入库时间作为 last_seen 返回
            last_seen: entry.created_date,
        }
    }
}

fn cache_key(person_id: &str) -> String {
    format!("{}{}", LOCATION_CACHE_PREFIX, person_id)
}

// 每个请求最多探测一次缓存可用性，探测结果在该请求内一直有效
pub async fn connect_cache(redis: &Arc<RedisClient>) -> Option<MultiplexedConnection> {
    let mut conn = match redis.get_multiplexed_async_connection().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("Cache unreachable, continuing without it: {}", e);
            return None;
        }
    };

    let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
    match pong {
        Ok(_) => Some(conn),
        Err(e) => {
            tracing::warn!("Cache unreachable, continuing without it: {}", e);
            None
        }
    }
}

impl PersonLocation {
    pub async fn upsert(
        pool: &PgPool,
        person_id: &str,
        latitude: f64,
        longitude: f64,
        last_seen: i64,
    ) -> Result<Self, sqlx::Error> {
        let location = sqlx::query_as::<_, PersonLocation>(
            r#"
            INSERT INTO latest_location (person_id, latitude, longitude, last_seen)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (person_id) DO UPDATE
            SET latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                last_seen = EXCLUDED.last_seen
            RETURNING person_id, latitude, longitude, last_seen
            "#,
        )
        .bind(person_id)
        .bind(latitude)
        .bind(longitude)
        .bind(last_seen)
        .fetch_one(pool)
        .await?;

        Ok(location)
    }

    pub async fn find_by_person(
        pool: &PgPool,
        person_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let location = sqlx::query_as::<_, PersonLocation>(
            r#"
            SELECT person_id, latitude, longitude, last_seen
            FROM latest_location
            WHERE person_id = $1
            "#,
        )
        .bind(person_id)
        .fetch_optional(pool)
        .await?;

        Ok(location)
    }

    // 优先读缓存，未命中回退数据库并回填缓存
    pub async fn resolve(
        pool: &PgPool,
        cache: &mut Option<MultiplexedConnection>,
        person_id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        if let Some(conn) = cache.as_mut() {
            let cached: redis::RedisResult<String> = conn.get(cache_key(person_id)).await;

            if let Ok(json_str) = cached {
                if let Ok(location) = serde_json::from_str::<PersonLocation>(&json_str) {
                    tracing::debug!("Get latest position from cache: {}", person_id);
                    return Ok(Some(location));
                }
            }
        }

        let location = Self::find_by_person(pool, person_id).await?;

        if let Some(ref loc) = location {
            loc.mirror_to_cache(cache).await;
        }

        Ok(location)
    }

    // 缓存只是镜像，写失败不影响主流程
    pub async fn mirror_to_cache(&self, cache: &mut Option<MultiplexedConnection>) {
        let Some(conn) = cache.as_mut() else {
            return;
        };

        if let Ok(json_str) = serde_json::to_string(self) {
            let stored: Result<(), redis::RedisError> = conn
                .set_ex(cache_key(&self.person_id), json_str, LOCATION_CACHE_EXPIRE)
                .await;
            match stored {
                Ok(()) => {
                    tracing::debug!("Set latest position to cache: {}", self.person_id)
                }
                Err(e) => tracing::warn!("Failed to mirror latest position to cache: {}", e),
            }
        }
    }
}

impl HistoryEntry {
    pub async fn append(
        pool: &PgPool,
        person_id: &str,
        latitude: f64,
        longitude: f64,
        last_seen: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO locations (person_id, latitude, longitude, last_seen)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(person_id)
        .bind(latitude)
        .bind(longitude)
        .bind(last_seen)
        .execute(pool)
        .await?;

        Ok(())
    }

    // 时间串按原样交给 Postgres 解析，格式由存储端决定
    pub async fn find_in_range(
        pool: &PgPool,
        person_id: &str,
        start_time: &str,
        end_time: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let entries = sqlx::query_as::<_, HistoryEntry>(
            r#"
            SELECT person_id, latitude, longitude, last_seen, created_date
            FROM locations
            WHERE person_id = $1
              AND created_date BETWEEN $2::timestamptz AND $3::timestamptz
            ORDER BY created_date
            "#,
        )
        .bind(person_id)
        .bind(start_time)
        .bind(end_time)
        .fetch_all(pool)
        .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_accepts_camel_case_person_id() {
        let req: RegisterLocationRequest =
            serde_json::from_str(r#"{"personId":"p1","latitude":12.9716,"longitude":77.5946}"#)
                .unwrap();
        assert_eq!(req.person_id, "p1");
        assert_eq!(req.latitude, 12.9716);
        assert_eq!(req.longitude, 77.5946);
    }

    #[test]
    fn distance_response_omits_unresolved_last_seen() {
        let resp = DistanceResponse {
            distance: "0".to_string(),
            unit: "KM".to_string(),
            last_seen: vec![
                PersonLastSeen {
                    person: "p1".to_string(),
                    last_seen: Some(1700000000000),
                },
                PersonLastSeen {
                    person: "p2".to_string(),
                    last_seen: None,
                },
            ],
        };

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["unit"], "KM");
        assert_eq!(value["distance"], "0");
        assert_eq!(value["last_seen"][0]["last_seen"], 1700000000000i64);
        assert!(value["last_seen"][1].get("last_seen").is_none());
    }

    #[test]
    fn history_response_serializes_empty_locations_array() {
        let resp = HistoryResponse {
            person_id: "p1".to_string(),
            locations: vec![],
        };

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["person_id"], "p1");
        assert!(value["locations"].as_array().unwrap().is_empty());
    }

    #[test]
    fn history_entry_reports_created_date_as_last_seen() {
        let created = DateTime::parse_from_rfc3339("2024-06-01T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = HistoryEntry {
            person_id: "p1".to_string(),
            latitude: 12.9716,
            longitude: 77.5946,
            last_seen: 1717237800000,
            created_date: created,
        };

        let point = LocationPoint::from(entry);
        assert_eq!(point.last_seen, created);
        assert_eq!(point.latitude, 12.9716);
    }

    #[test]
    fn cache_key_is_prefixed_with_namespace() {
        assert_eq!(cache_key("p1"), "person:loc:p1");
    }

    #[test]
    fn cached_position_round_trips_through_json() {
        let location = PersonLocation {
            person_id: "p1".to_string(),
            latitude: 12.9716,
            longitude: 77.5946,
            last_seen: 1700000000000,
        };

        let json_str = serde_json::to_string(&location).unwrap();
        let parsed: PersonLocation = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.person_id, "p1");
        assert_eq!(parsed.last_seen, 1700000000000);
    }
}
