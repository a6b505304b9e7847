//! Speed policy
//!
//! Pure arbitration between sensor-driven demand and the administrative
//! override. No hardware or store dependency; this is the unit the safety
//! interlock lives in, so it carries the most exhaustive tests.

use crate::data::FanSpeed;

/// Resolve the speed that should be driven to hardware.
///
/// The override wins except when no override is configured or the sensors
/// demand `Max` — an overtemperature condition must never be suppressed by
/// an administrator setting. An empty result falls back to `Normal`.
pub fn resolve(sensor: Option<FanSpeed>, override_speed: Option<FanSpeed>) -> FanSpeed {
    let winner = if override_speed.is_none() || sensor == Some(FanSpeed::Max) {
        sensor
    } else {
        override_speed
    };
    winner.unwrap_or(FanSpeed::Normal)
}

/// Aggregate thermal-zone demand for a subsystem.
///
/// The result is the maximum demand over all associated zones; a subsystem
/// with no zones defaults to `Normal`.
pub fn aggregate_zones<I>(zones: I) -> FanSpeed
where
    I: IntoIterator<Item = FanSpeed>,
{
    zones
        .into_iter()
        .max()
        .unwrap_or(FanSpeed::Normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use FanSpeed::*;

    const ALL: [FanSpeed; 5] = [Slow, Normal, Medium, Fast, Max];

    #[test]
    fn sensor_max_beats_every_override() {
        for override_speed in ALL {
            assert_eq!(resolve(Some(Max), Some(override_speed)), Max);
        }
        assert_eq!(resolve(Some(Max), None), Max);
    }

    #[test]
    fn override_wins_below_max() {
        for sensor in [Slow, Normal, Medium, Fast] {
            for override_speed in ALL {
                assert_eq!(resolve(Some(sensor), Some(override_speed)), override_speed);
            }
        }
    }

    #[test]
    fn no_override_follows_sensor() {
        for sensor in ALL {
            assert_eq!(resolve(Some(sensor), None), sensor);
        }
    }

    #[test]
    fn empty_inputs_fall_back_to_normal() {
        assert_eq!(resolve(None, None), Normal);
    }

    #[test]
    fn zone_aggregation_takes_maximum() {
        assert_eq!(aggregate_zones([Slow, Medium, Normal]), Medium);
        assert_eq!(aggregate_zones([Slow, Slow]), Slow);
        assert_eq!(aggregate_zones([Normal, Max, Fast]), Max);
    }

    #[test]
    fn no_zones_defaults_to_normal() {
        assert_eq!(aggregate_zones([]), Normal);
    }
}
