// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Beat/time mapping.
//!
//! A mapping is a strictly monotone polyline through `(beat, time)`
//! breakpoints derived from the level's tempo-control events. Conversions
//! in either direction find the enclosing segment and interpolate.

use serde::Serialize;

use crate::document::{EventId, LevelProperties};

/// Tempo in effect before any tempo-control event
pub const DEFAULT_BPM: f64 = 100.0;

/// Highest tempo the editor accepts
pub const MAX_BPM: f64 = 10_000.0;

/// Clamp a tempo into `(0, MAX_BPM]`.
///
/// Out-of-range and non-finite values become `MAX_BPM`; a zero or negative
/// tempo would break monotonicity.
pub fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_nan() || bpm <= 0.0 || bpm > MAX_BPM {
        MAX_BPM
    } else {
        bpm
    }
}

/// A breakpoint of the mapping
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeBeatPoint {
    /// Beat
    pub b: f64,
    /// Time in seconds
    pub t: f64,
    /// Tempo of the segment starting here
    pub bpm: f64,
}

/// Constants derived from the level properties
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartData {
    /// Beat that plays at time 0
    pub true_first_beat: f64,
    /// Controls before this beat are preloaded
    pub load_beat: f64,
    /// Whether preloading applies at all
    pub perform_load: bool,
}

impl StartData {
    /// Derive start data from level properties
    pub fn from_properties(properties: &LevelProperties) -> Self {
        let offset = properties.offset.unwrap_or(0.0);
        let true_first_beat = properties.starting_beat.unwrap_or(-offset);
        let load_beat = properties.load_beat.unwrap_or(0.0);
        let perform_load = properties.load_beat.map_or(false, |b| b != 0.0) && true_first_beat < 0.0;
        Self {
            true_first_beat,
            load_beat,
            perform_load,
        }
    }

    /// Whether a control at this beat is collapsed onto the first beat
    pub fn is_preloaded(&self, beat: f64) -> bool {
        self.perform_load && beat < self.load_beat
    }
}

impl Default for StartData {
    fn default() -> Self {
        Self {
            true_first_beat: 0.0,
            load_beat: 0.0,
            perform_load: false,
        }
    }
}

/// Input to mapping computation: a tempo-control event's position and tempo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoControl {
    pub id: EventId,
    pub beat: f64,
    pub bpm: Option<f64>,
}

/// Where a control ended up during mapping computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPlacement {
    pub id: EventId,
    /// Beat the control takes effect at
    pub real_beat: f64,
    /// Before the first beat and not preloaded; has no effect
    pub skipped: bool,
    pub preloaded: bool,
}

/// Result of `compute_mapping`
#[derive(Debug, Clone)]
pub struct ComputedMapping {
    pub mapping: Mapping,
    /// One entry per input control, in input order
    pub placements: Vec<ControlPlacement>,
}

/// Build the mapping implied by a set of tempo controls.
///
/// With `stop_at`, the walk ends just before that control, giving the tempo
/// state in effect before it.
pub fn compute_mapping(
    start: &StartData,
    controls: &[TempoControl],
    stop_at: Option<EventId>,
) -> ComputedMapping {
    let mut placements: Vec<ControlPlacement> = controls
        .iter()
        .map(|c| {
            let preloaded = start.is_preloaded(c.beat);
            ControlPlacement {
                id: c.id,
                real_beat: if preloaded { start.true_first_beat } else { c.beat },
                skipped: false,
                preloaded,
            }
        })
        .collect();

    let mut preloaded: Vec<usize> = (0..controls.len()).filter(|&i| placements[i].preloaded).collect();
    let mut real: Vec<usize> = (0..controls.len()).filter(|&i| !placements[i].preloaded).collect();
    preloaded.sort_by(|&a, &b| controls[a].beat.total_cmp(&controls[b].beat));
    real.sort_by(|&a, &b| placements[a].real_beat.total_cmp(&placements[b].real_beat));

    let mut current_bpm = DEFAULT_BPM;
    for &i in &preloaded {
        if let Some(bpm) = controls[i].bpm {
            current_bpm = clamp_bpm(bpm);
        }
    }

    let first = start.true_first_beat;
    let mut points = vec![
        TimeBeatPoint {
            b: first - 1.0,
            t: -60.0 / current_bpm,
            bpm: current_bpm,
        },
        TimeBeatPoint {
            b: first,
            t: 0.0,
            bpm: current_bpm,
        },
    ];

    for &i in &real {
        if Some(controls[i].id) == stop_at {
            break;
        }
        let beat = placements[i].real_beat;
        if beat < first {
            placements[i].skipped = true;
            continue;
        }

        let last = points[points.len() - 1];
        if beat > last.b {
            let delta = beat - last.b;
            points.push(TimeBeatPoint {
                b: beat,
                t: last.t + delta * 60.0 / current_bpm,
                bpm: current_bpm,
            });
        }

        if let Some(bpm) = controls[i].bpm {
            current_bpm = clamp_bpm(bpm);
        }
        if let Some(last) = points.last_mut() {
            last.bpm = current_bpm;
        }
    }

    let last = points[points.len() - 1];
    points.push(TimeBeatPoint {
        b: last.b + 1.0,
        t: last.t + 60.0 / current_bpm,
        bpm: current_bpm,
    });

    ComputedMapping {
        mapping: Mapping { points },
        placements,
    }
}

/// Piecewise-linear beat/time function
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Mapping {
    points: Vec<TimeBeatPoint>,
}

impl Mapping {
    /// Wrap raw breakpoints. The caller is responsible for ordering.
    pub fn from_points(points: Vec<TimeBeatPoint>) -> Self {
        Self { points }
    }

    /// Breakpoints in order
    pub fn points(&self) -> &[TimeBeatPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Index of the segment holding `x`: the last breakpoint at or before it,
    /// clamped to the first and last segments. Requires at least 2 points.
    fn segment(&self, x: f64, key: impl Fn(&TimeBeatPoint) -> f64) -> usize {
        let inner = &self.points[1..self.points.len() - 1];
        inner.partition_point(|p| key(p) <= x)
    }

    /// Convert a beat to a time in seconds
    pub fn beat_to_time(&self, beat: f64) -> f64 {
        match self.points.len() {
            0 => beat,
            1 => beat - self.points[0].b + self.points[0].t,
            _ => {
                let i = self.segment(beat, |p| p.b);
                let (a, b) = (self.points[i], self.points[i + 1]);
                interpolate(beat, a.b, b.b, a.t, b.t)
            }
        }
    }

    /// Convert a time in seconds to a beat
    pub fn time_to_beat(&self, time: f64) -> f64 {
        match self.points.len() {
            0 => time,
            1 => time - self.points[0].t + self.points[0].b,
            _ => {
                let i = self.segment(time, |p| p.t);
                let (a, b) = (self.points[i], self.points[i + 1]);
                interpolate(time, a.t, b.t, a.b, b.b)
            }
        }
    }

    /// Tempo of the segment holding a beat. Informational only.
    pub fn beat_to_bpm(&self, beat: f64) -> f64 {
        if self.points.len() < 2 {
            // Matches the unit slope used by the conversions above.
            return 60.0;
        }
        self.points[self.segment(beat, |p| p.b)].bpm
    }

    /// Tempo of the segment holding a time
    pub fn time_to_bpm(&self, time: f64) -> f64 {
        self.beat_to_bpm(self.time_to_beat(time))
    }

    /// Whether beats and times both strictly increase
    pub fn is_monotonic(&self) -> bool {
        self.points.windows(2).all(|w| w[1].b > w[0].b && w[1].t > w[0].t)
    }
}

fn interpolate(x: f64, x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    let p = (x - x0) / (x1 - x0);
    y0 + p * (y1 - y0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const EPS: f64 = 1e-9;

    fn control(raw: u32, beat: f64, bpm: Option<f64>) -> TempoControl {
        TempoControl {
            id: EventId::from_raw(raw),
            beat,
            bpm,
        }
    }

    fn two_tempo_mapping() -> Mapping {
        let controls = [control(0, 0.0, Some(120.0)), control(1, 16.0, Some(90.0))];
        compute_mapping(&StartData::default(), &controls, None).mapping
    }

    #[test]
    fn test_no_controls() {
        let mapping = compute_mapping(&StartData::default(), &[], None).mapping;
        assert_eq!(mapping.len(), 3);
        assert!(mapping.is_monotonic());
        assert!((mapping.beat_to_time(4.0) - 2.4).abs() < EPS);
        assert_eq!(mapping.beat_to_bpm(4.0), DEFAULT_BPM);
    }

    #[test]
    fn test_two_tempos() {
        let mapping = two_tempo_mapping();
        let points = mapping.points();
        assert_eq!(points.len(), 4);
        assert_eq!(points[1], TimeBeatPoint { b: 0.0, t: 0.0, bpm: 120.0 });
        assert_eq!(points[2], TimeBeatPoint { b: 16.0, t: 8.0, bpm: 90.0 });

        assert!((mapping.beat_to_time(16.0) - 8.0).abs() < EPS);
        assert!((mapping.beat_to_time(20.0) - (8.0 + 4.0 * 60.0 / 90.0)).abs() < EPS);
        assert!((mapping.time_to_beat(8.0) - 16.0).abs() < EPS);
        // Before all points extrapolates the first segment at the baseline tempo
        assert!((mapping.beat_to_time(-2.0) + 1.2).abs() < EPS);

        assert_eq!(mapping.beat_to_bpm(-5.0), DEFAULT_BPM);
        assert_eq!(mapping.beat_to_bpm(10.0), 120.0);
        assert_eq!(mapping.beat_to_bpm(100.0), 90.0);
        assert_eq!(mapping.time_to_bpm(9.0), 90.0);
    }

    #[test]
    fn test_degenerate_mappings() {
        let empty = Mapping::default();
        assert_eq!(empty.beat_to_time(3.5), 3.5);
        assert_eq!(empty.time_to_beat(-1.0), -1.0);
        assert_eq!(empty.beat_to_bpm(0.0), 60.0);

        let single = Mapping::from_points(vec![TimeBeatPoint { b: 4.0, t: 1.0, bpm: 200.0 }]);
        assert_eq!(single.beat_to_time(6.0), 3.0);
        assert_eq!(single.time_to_beat(3.0), 6.0);
        assert_eq!(single.beat_to_bpm(6.0), 60.0);
    }

    #[test]
    fn test_preload_collapse() {
        let start = StartData {
            true_first_beat: -4.0,
            load_beat: 10.0,
            perform_load: true,
        };
        let controls = [control(0, 5.0, Some(200.0)), control(1, 12.0, Some(150.0))];
        let computed = compute_mapping(&start, &controls, None);
        let mapping = &computed.mapping;

        assert!(mapping.is_monotonic());
        assert!(mapping.points().iter().all(|p| p.b != 5.0));
        assert_eq!(mapping.beat_to_time(-4.0), 0.0);
        assert_eq!(mapping.beat_to_bpm(-4.0), 200.0);
        // 9 beats at the preloaded tempo, no break at beat 5
        assert!((mapping.beat_to_time(5.0) - 9.0 * 0.3).abs() < EPS);
        assert!((mapping.beat_to_time(12.0) - 16.0 * 0.3).abs() < EPS);
        assert_eq!(mapping.beat_to_bpm(12.5), 150.0);

        assert!(computed.placements[0].preloaded);
        assert_eq!(computed.placements[0].real_beat, -4.0);
        assert!(!computed.placements[1].preloaded);
    }

    #[test]
    fn test_controls_before_first_beat_are_skipped() {
        let start = StartData {
            true_first_beat: -4.0,
            load_beat: 0.0,
            perform_load: false,
        };
        let controls = [control(0, -10.0, Some(300.0)), control(1, 0.0, Some(120.0))];
        let computed = compute_mapping(&start, &controls, None);
        assert!(computed.placements[0].skipped);
        assert!(!computed.placements[1].skipped);
        assert_eq!(computed.mapping.beat_to_bpm(-2.0), DEFAULT_BPM);
        assert!((computed.mapping.beat_to_time(0.0) - 4.0 * 0.6).abs() < EPS);
    }

    #[test]
    fn test_stop_at_truncates() {
        let controls = [control(0, 0.0, Some(120.0)), control(1, 16.0, Some(90.0))];
        let entry = compute_mapping(&StartData::default(), &controls, Some(EventId::from_raw(1)));
        assert_eq!(entry.mapping.len(), 3);
        assert_eq!(entry.mapping.beat_to_bpm(40.0), 120.0);
        assert!((entry.mapping.beat_to_time(32.0) - 16.0).abs() < EPS);
    }

    #[test]
    fn test_absent_bpm_inherits() {
        let controls = [control(0, 0.0, Some(120.0)), control(1, 8.0, None)];
        let mapping = compute_mapping(&StartData::default(), &controls, None).mapping;
        assert_eq!(mapping.beat_to_bpm(10.0), 120.0);
        assert!((mapping.beat_to_time(10.0) - 5.0).abs() < EPS);
    }

    #[test]
    fn test_clamp_bpm() {
        assert_eq!(clamp_bpm(140.0), 140.0);
        assert_eq!(clamp_bpm(0.0), MAX_BPM);
        assert_eq!(clamp_bpm(-5.0), MAX_BPM);
        assert_eq!(clamp_bpm(20_000.0), MAX_BPM);
        assert_eq!(clamp_bpm(f64::NAN), MAX_BPM);
        assert_eq!(clamp_bpm(f64::INFINITY), MAX_BPM);
    }

    #[test]
    fn test_random_mappings_are_monotonic_and_invertible() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let start = StartData {
                true_first_beat: rng.gen_range(-8.0..2.0),
                load_beat: rng.gen_range(-4.0..8.0),
                perform_load: rng.gen_bool(0.5),
            };
            let count = rng.gen_range(0..12);
            let controls: Vec<TempoControl> = (0..count)
                .map(|i| {
                    let bpm = if rng.gen_bool(0.2) {
                        None
                    } else {
                        Some(rng.gen_range(-50.0..400.0))
                    };
                    control(i, rng.gen_range(-10.0..64.0), bpm)
                })
                .collect();

            let mapping = compute_mapping(&start, &controls, None).mapping;
            assert!(mapping.len() >= 2);
            assert!(mapping.is_monotonic(), "{:?}", mapping);

            for _ in 0..20 {
                let beat = rng.gen_range(-16.0..80.0);
                let back = mapping.time_to_beat(mapping.beat_to_time(beat));
                assert!((back - beat).abs() < 1e-6, "beat {} came back as {}", beat, back);

                let time = rng.gen_range(-10.0..60.0);
                let back = mapping.beat_to_time(mapping.time_to_beat(time));
                assert!((back - time).abs() < 1e-6, "time {} came back as {}", time, back);
            }
        }
    }
}
