//! Adaptive duration computation (spec.md §3 `AdaptiveDurationConfig`,
//! §4.3 `getRecentDurations`). Grounded on the teacher's
//! `materialization.rs` filter-driven window-query style, adapted to
//! an average-plus-buffer estimate instead of a raw pass-through.

use crate::error::CoreError;
use crate::models::{AdaptiveDurationConfig, DurationSpec};
use crate::storage::DurationWindow;

/// Compute the effective duration in minutes for an instance of a series
/// whose `duration` is `DurationSpec::Adaptive`: the mean of its recent
/// logged durations (last N completions, or within a day window — whichever
/// `config` specifies), inflated by `buffer_percent`, and clamped to
/// `[min, max]` when set. Falls back to `fallback_duration` when there is no
/// history yet.
pub fn effective_minutes(config: &AdaptiveDurationConfig, recent: &[u32]) -> u32 {
    let base = if recent.is_empty() {
        config.fallback_duration as f64
    } else {
        recent.iter().copied().map(|m| m as f64).sum::<f64>() / recent.len() as f64
    };
    let buffered = base * (1.0 + config.buffer_percent / 100.0);
    let mut minutes = buffered.round() as u32;
    if let Some(min) = config.min {
        minutes = minutes.max(min);
    }
    if let Some(max) = config.max {
        minutes = minutes.min(max);
    }
    minutes
}

/// Resolve a series' nominal duration to a concrete minute count, consulting
/// `recent` only when `duration` is `Adaptive`. Non-adaptive durations pass
/// through unchanged; an all-day series has no minute duration.
pub fn resolve(
    duration: DurationSpec,
    adaptive: Option<&AdaptiveDurationConfig>,
    recent: &[u32],
) -> Result<Option<u32>, CoreError> {
    match duration {
        DurationSpec::AllDay => Ok(None),
        DurationSpec::Minutes(m) => Ok(Some(m)),
        DurationSpec::Adaptive => {
            let config = adaptive.ok_or_else(|| {
                CoreError::Validation("adaptive duration requires an AdaptiveDurationConfig".into())
            })?;
            Ok(Some(effective_minutes(config, recent)))
        }
    }
}

/// The `DurationWindow` a series' `AdaptiveDurationConfig` resolves to for a
/// `get_recent_durations` call as-of `as_of`.
pub fn window_for(config: &AdaptiveDurationConfig, as_of: crate::time::CalendarDate) -> DurationWindow {
    if config.window_days > 0 {
        DurationWindow::WindowDays {
            window_days: config.window_days,
            as_of,
        }
    } else {
        DurationWindow::LastN(config.last_n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn config() -> AdaptiveDurationConfig {
        AdaptiveDurationConfig {
            series_id: Uuid::new_v4(),
            fallback_duration: 30,
            buffer_percent: 10.0,
            last_n: 5,
            window_days: 30,
            min: None,
            max: None,
        }
    }

    #[test]
    fn falls_back_when_no_history() {
        assert_eq!(effective_minutes(&config(), &[]), 30);
    }

    #[test]
    fn averages_and_applies_buffer() {
        let minutes = effective_minutes(&config(), &[20, 30, 40]);
        // mean = 30, buffered by 10% = 33
        assert_eq!(minutes, 33);
    }

    #[test]
    fn clamps_to_configured_bounds() {
        let mut c = config();
        c.max = Some(25);
        assert_eq!(effective_minutes(&c, &[100]), 25);
        c.max = None;
        c.min = Some(50);
        assert_eq!(effective_minutes(&c, &[10]), 50);
    }

    #[test]
    fn resolve_passes_through_fixed_minutes() {
        assert_eq!(resolve(DurationSpec::Minutes(15), None, &[]).unwrap(), Some(15));
        assert_eq!(resolve(DurationSpec::AllDay, None, &[]).unwrap(), None);
    }

    #[test]
    fn resolve_requires_config_for_adaptive() {
        assert!(resolve(DurationSpec::Adaptive, None, &[]).is_err());
    }
}
