use std::time::{SystemTime, UNIX_EPOCH};

use crate::rng::Rng;
use crate::types::{Direction, Vec2};

pub fn now_ms() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    now as u64
}

/// Euclidean distance rounded to the nearest whole unit.
pub fn distance_between(a: Vec2, b: Vec2) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt().round()
}

/// Bearing from `from` to `to` in whole degrees, zero pointing down the
/// screen.
pub fn bearing_deg(from: Vec2, to: Vec2) -> i64 {
    (to.y - from.y).atan2(to.x - from.x).to_degrees().round() as i64 - 90
}

pub(super) fn random_direction(rng: &mut Rng) -> Direction {
    match rng.int(0, 3) {
        0 => Direction::Up,
        1 => Direction::Down,
        2 => Direction::Right,
        _ => Direction::Left,
    }
}

/// Direction that increases the offset from `threat`, along whichever axis
/// already has the larger offset.
pub(super) fn away_from(position: Vec2, threat: Vec2) -> Direction {
    let dx = position.x - threat.x;
    let dy = position.y - threat.y;
    if dx.abs() > dy.abs() {
        if dx > 0.0 {
            Direction::Right
        } else {
            Direction::Left
        }
    } else if dy > 0.0 {
        Direction::Down
    } else {
        Direction::Up
    }
}

pub(super) fn random_position(rng: &mut Rng, half_size: i32) -> Vec2 {
    Vec2::new(
        rng.int(-half_size + 1, half_size) as f64,
        rng.int(-half_size + 1, half_size) as f64,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_rounded() {
        assert_eq!(distance_between(Vec2::ZERO, Vec2::new(3.0, 4.0)), 5.0);
        assert_eq!(distance_between(Vec2::ZERO, Vec2::new(1.0, 1.0)), 1.0);
        assert_eq!(distance_between(Vec2::ZERO, Vec2::new(20.5, 0.0)), 21.0);
    }

    #[test]
    fn away_from_prefers_larger_axis() {
        let threat = Vec2::ZERO;
        assert_eq!(away_from(Vec2::new(50.0, 10.0), threat), Direction::Right);
        assert_eq!(away_from(Vec2::new(-50.0, 10.0), threat), Direction::Left);
        assert_eq!(away_from(Vec2::new(5.0, 30.0), threat), Direction::Down);
        assert_eq!(away_from(Vec2::new(5.0, -30.0), threat), Direction::Up);
        assert_eq!(away_from(threat, threat), Direction::Up);
    }

    #[test]
    fn bearing_points_down_at_zero() {
        assert_eq!(bearing_deg(Vec2::ZERO, Vec2::new(0.0, 10.0)), 0);
        assert_eq!(bearing_deg(Vec2::ZERO, Vec2::new(10.0, 0.0)), -90);
    }

    #[test]
    fn random_positions_stay_on_the_map() {
        let mut rng = Rng::new(11);
        for _ in 0..500 {
            let pos = random_position(&mut rng, 4_000);
            assert!((-3_999.0..=4_000.0).contains(&pos.x));
            assert!((-3_999.0..=4_000.0).contains(&pos.y));
        }
    }
}
