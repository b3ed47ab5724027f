use chrono::Utc;

// 球面余弦定理计算两点间直线距离，返回公里
pub fn calculate_distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let rad_lat1 = lat1.to_radians();
    let rad_lat2 = lat2.to_radians();
    let rad_theta = (lon1 - lon2).to_radians();

    let cos_d =
        rad_lat1.sin() * rad_lat2.sin() + rad_lat1.cos() * rad_lat2.cos() * rad_theta.cos();
    // acos 定义域是 [-1, 1]，浮点误差会把同一点的余弦推到界外
    let cos_d = cos_d.clamp(-1.0, 1.0);

    let dist = cos_d.acos().to_degrees() * 60.0 * 1.1515 * 1.609344;
    dist.abs()
}

pub fn valid_coordinate(value: f64) -> bool {
    (-180.0..=180.0).contains(&value)
}

pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero_distance() {
        let d = calculate_distance_km(12.9716, 77.5946, 12.9716, 77.5946);
        assert!(d < 1e-3, "expected ~0, got {}", d);
    }

    #[test]
    fn bangalore_to_chennai_is_about_290_km() {
        let d = calculate_distance_km(12.9716, 77.5946, 13.0827, 80.2707);
        assert!((d - 290.0).abs() < 5.0, "expected ~290, got {}", d);
    }

    #[test]
    fn distance_is_symmetric() {
        let d1 = calculate_distance_km(12.9716, 77.5946, 13.0827, 80.2707);
        let d2 = calculate_distance_km(13.0827, 80.2707, 12.9716, 77.5946);
        assert!((d1 - d2).abs() < 1e-9);
    }

    #[test]
    fn distance_is_never_negative_or_nan() {
        // 对跖点附近余弦接近 -1，同点附近接近 1
        let d = calculate_distance_km(0.0, 0.0, 0.0, 180.0);
        assert!(d.is_finite() && d >= 0.0);
        let d = calculate_distance_km(45.0, 45.0, 45.0, 45.0);
        assert!(d.is_finite() && d >= 0.0);
    }

    #[test]
    fn coordinates_within_bounds_are_valid() {
        assert!(valid_coordinate(-180.0));
        assert!(valid_coordinate(180.0));
        assert!(valid_coordinate(0.0));
        assert!(valid_coordinate(77.5946));
    }

    #[test]
    fn coordinates_outside_bounds_are_invalid() {
        assert!(!valid_coordinate(180.1));
        assert!(!valid_coordinate(-180.1));
        assert!(!valid_coordinate(f64::NAN));
    }
}
