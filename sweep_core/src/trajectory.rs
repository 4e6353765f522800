//! Set-point trajectory generation.
//!
//! A `Trajectory` is a lazy, finite, non-restartable iterator over `f64`
//! set-points, assembled from piecewise linear segments. Each segment spans
//! `[start, end]` inclusive with evenly spaced points; a one-point segment
//! yields just its start value (linspace convention), so there is never a
//! division by zero.

/// One monotonic linear segment.
#[derive(Debug, Clone, Copy)]
struct Segment {
    start: f64,
    end: f64,
    points: usize,
}

impl Segment {
    fn value_at(&self, idx: usize) -> f64 {
        if self.points <= 1 {
            self.start
        } else {
            let frac = idx as f64 / (self.points - 1) as f64;
            self.start + (self.end - self.start) * frac
        }
    }
}

/// Lazy iterator over the set-points of a sweep.
#[derive(Debug, Clone)]
pub struct Trajectory {
    segments: Vec<Segment>,
    seg_idx: usize,
    point_idx: usize,
    remaining: usize,
}

impl Trajectory {
    fn from_segments(segments: Vec<Segment>) -> Self {
        let remaining = segments.iter().map(|s| s.points).sum();
        Self {
            segments,
            seg_idx: 0,
            point_idx: 0,
            remaining,
        }
    }

    /// Evenly spaced ramp from `start` to `end`, `points` values inclusive.
    /// `points == 1` yields `[start]`; `points == 0` yields nothing.
    pub fn ramp(start: f64, end: f64, points: usize) -> Self {
        Self::from_segments(vec![Segment { start, end, points }])
    }

    /// Hysteresis loop: 0 -> +A, then `loops` repetitions of the tiled middle
    /// +A -> 0 -> -A -> 0 -> +A, then the final descent +A -> 0.
    ///
    /// Total length is `n + loops * 4n + n` for `n` points per leg.
    pub fn hysteresis(amplitude: f64, points_per_leg: usize, loops: usize) -> Self {
        let n = points_per_leg;
        let leg = |start: f64, end: f64| Segment {
            start,
            end,
            points: n,
        };
        let mut segments = Vec::with_capacity(2 + loops * 4);
        segments.push(leg(0.0, amplitude));
        for _ in 0..loops {
            segments.push(leg(amplitude, 0.0));
            segments.push(leg(0.0, -amplitude));
            segments.push(leg(-amplitude, 0.0));
            segments.push(leg(0.0, amplitude));
        }
        segments.push(leg(amplitude, 0.0));
        Self::from_segments(segments)
    }

    /// Up/down ramp 0 -> `max` -> 0, the inner voltage sweep of a
    /// stepped-field measurement.
    pub fn up_down(max: f64, points_per_leg: usize) -> Self {
        Self::from_segments(vec![
            Segment {
                start: 0.0,
                end: max,
                points: points_per_leg,
            },
            Segment {
                start: max,
                end: 0.0,
                points: points_per_leg,
            },
        ])
    }
}

impl Iterator for Trajectory {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        loop {
            let seg = self.segments.get(self.seg_idx)?;
            if self.point_idx < seg.points {
                let v = seg.value_at(self.point_idx);
                self.point_idx += 1;
                self.remaining -= 1;
                return Some(v);
            }
            self.seg_idx += 1;
            self.point_idx = 0;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Trajectory {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_spans_inclusive_and_monotonic() {
        let pts: Vec<f64> = Trajectory::ramp(0.0, 2.0, 5).collect();
        assert_eq!(pts, vec![0.0, 0.5, 1.0, 1.5, 2.0]);

        let down: Vec<f64> = Trajectory::ramp(1.0, -1.0, 3).collect();
        assert_eq!(down, vec![1.0, 0.0, -1.0]);
    }

    #[test]
    fn single_point_ramp_has_no_division_by_zero() {
        let pts: Vec<f64> = Trajectory::ramp(3.0, 7.0, 1).collect();
        assert_eq!(pts, vec![3.0]);
        assert_eq!(Trajectory::ramp(0.0, 1.0, 0).count(), 0);
    }

    #[test]
    fn hysteresis_length_and_shape() {
        let n = 4;
        let loops = 2;
        let traj = Trajectory::hysteresis(1.0, n, loops);
        assert_eq!(traj.len(), n + loops * 4 * n + n);
        let pts: Vec<f64> = traj.collect();
        assert_eq!(pts[0], 0.0);
        assert_eq!(pts[n - 1], 1.0);
        assert_eq!(*pts.last().unwrap(), 0.0);
        let min = pts.iter().cloned().fold(f64::INFINITY, f64::min);
        assert_eq!(min, -1.0);
    }

    #[test]
    fn up_down_peaks_at_max() {
        let pts: Vec<f64> = Trajectory::up_down(2.0, 3).collect();
        assert_eq!(pts, vec![0.0, 1.0, 2.0, 2.0, 1.0, 0.0]);
    }

    #[test]
    fn exact_size_decreases_as_consumed() {
        let mut traj = Trajectory::ramp(0.0, 1.0, 10);
        assert_eq!(traj.len(), 10);
        traj.next();
        assert_eq!(traj.len(), 9);
    }
}
