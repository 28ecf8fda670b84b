//! Cycling item selection (spec.md §3/§4.7): rotates a series' title through
//! a fixed item list, either sequentially or via a deterministic pseudo-random
//! sequence, with an optional "gap leap" mode where the rotation is driven by
//! an externally advanced index rather than the instance's position in the
//! expanded date sequence.

use crate::error::CoreError;
use crate::models::{CyclingConfig, CyclingMode};

/// Resolve the item a given instance should use. Pure given `config` and
/// `instance_number` (the 0-based position of this date in the sorted
/// expanded sequence) — never touches storage or the clock.
///
/// - sequential + gap leap: `items[current_index % len]`; the caller advances
///   `current_index` externally via [`advance`].
/// - sequential, no gap leap: `items[instance_number % len]`.
/// - random: a deterministic hash of `current_index` (gap leap) or
///   `instance_number` (otherwise), modulo `len`.
pub fn resolve_item(config: &CyclingConfig, instance_number: u32) -> Result<&str, CoreError> {
    config.validate()?;
    let len = config.items.len() as u32;
    let idx = match config.mode {
        CyclingMode::Sequential if config.gap_leap => config.current_index % len,
        CyclingMode::Sequential => instance_number % len,
        CyclingMode::Random => {
            let seed = if config.gap_leap {
                config.current_index
            } else {
                instance_number
            };
            random_index(seed, len)
        }
    };
    Ok(config.items[idx as usize].as_str())
}

/// Resolve the effective title for an instance: the cycling item when
/// `cycling` is configured, otherwise the series' own title (spec.md §4.7
/// `resolveInstanceTitle`).
pub fn resolve_instance_title<'a>(
    series_title: &'a str,
    cycling: Option<&'a CyclingConfig>,
    instance_number: u32,
) -> Result<&'a str, CoreError> {
    match cycling {
        Some(config) => resolve_item(config, instance_number),
        None => Ok(series_title),
    }
}

/// Advance the rotation by one step. Requires `gap_leap = true` — sequential
/// and random modes without gap leap derive their index purely from
/// `instance_number` and have nothing to advance.
pub fn advance(config: &mut CyclingConfig) -> Result<(), CoreError> {
    config.validate()?;
    if !config.gap_leap {
        return Err(CoreError::GapLeapDisabled);
    }
    config.current_index = (config.current_index + 1) % config.items.len() as u32;
    Ok(())
}

pub fn reset(config: &mut CyclingConfig) {
    config.current_index = 0;
}

/// Deterministic "random mode" index: xor the seed with the golden-ratio
/// constant, fold it through two multiply-xor-shift rounds, and reduce modulo
/// the item count. Pinned exactly per spec.md §4.7 so other implementations
/// reproduce the same sequence for the same seed.
fn random_index(seed: u32, len: u32) -> u32 {
    let mut h = (seed as u64) ^ 0x9e3779b9u64;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    (h % len as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn config(mode: CyclingMode, gap_leap: bool) -> CyclingConfig {
        CyclingConfig {
            series_id: Uuid::new_v4(),
            items: vec!["A".into(), "B".into(), "C".into()],
            mode,
            gap_leap,
            current_index: 0,
        }
    }

    #[test]
    fn sequential_no_gap_leap_follows_instance_number() {
        let c = config(CyclingMode::Sequential, false);
        let got: Vec<&str> = (0..6u32)
            .map(|n| resolve_item(&c, n).unwrap())
            .collect();
        assert_eq!(got, vec!["A", "B", "C", "A", "B", "C"]);
    }

    #[test]
    fn advance_requires_gap_leap() {
        let mut c = config(CyclingMode::Sequential, false);
        assert!(matches!(advance(&mut c), Err(CoreError::GapLeapDisabled)));
    }

    #[test]
    fn gap_leap_advance_rotates_current_index() {
        let mut c = config(CyclingMode::Sequential, true);
        assert_eq!(resolve_item(&c, 0).unwrap(), "A");
        advance(&mut c).unwrap();
        assert_eq!(resolve_item(&c, 0).unwrap(), "B");
        advance(&mut c).unwrap();
        advance(&mut c).unwrap();
        assert_eq!(resolve_item(&c, 0).unwrap(), "A");
    }

    #[test]
    fn random_mode_is_deterministic_given_same_seed() {
        assert_eq!(random_index(3, 7), random_index(3, 7));
        let c = config(CyclingMode::Random, false);
        assert_eq!(
            resolve_item(&c, 5).unwrap(),
            resolve_item(&c, 5).unwrap()
        );
    }

    #[test]
    fn resolve_instance_title_falls_back_to_series_title() {
        assert_eq!(
            resolve_instance_title("Plain Series", None, 2).unwrap(),
            "Plain Series"
        );
        let c = config(CyclingMode::Sequential, false);
        assert_eq!(
            resolve_instance_title("Plain Series", Some(&c), 2).unwrap(),
            "C"
        );
    }

    #[test]
    fn empty_items_is_rejected() {
        let mut c = config(CyclingMode::Sequential, true);
        c.items.clear();
        assert!(resolve_item(&c, 0).is_err());
        assert!(advance(&mut c).is_err());
    }

    #[test]
    fn reset_zeroes_current_index() {
        let mut c = config(CyclingMode::Sequential, true);
        c.current_index = 2;
        reset(&mut c);
        assert_eq!(c.current_index, 0);
    }
}
