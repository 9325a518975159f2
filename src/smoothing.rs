//! Bounded-window moving average over vowel-space coordinates
//!
//! Until the history holds `window` coordinates the smoother is a cumulative
//! average; after that it slides, subtracting the oldest coordinate's share.
//! The cumulative branch runs one last time when the history holds
//! `window - 1` entries, so the first sliding update happens at length `window`.

use std::collections::VecDeque;

use crate::types::Coordinate;

pub struct PositionSmoother {
    window: usize,
    history: VecDeque<Coordinate>,
    smoothed: Option<Coordinate>,
}

impl PositionSmoother {
    /// A window of 0 is treated as 1.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            history: VecDeque::with_capacity(window),
            smoothed: None,
        }
    }

    /// Folds `coordinate` into the average and returns the new smoothed value.
    pub fn push(&mut self, coordinate: Coordinate) -> Coordinate {
        let next = match self.smoothed {
            None => coordinate,
            Some(current) if self.history.len() < self.window => {
                let n = self.history.len() as f64;
                current.zip_with(coordinate, |s, new| (new + n * s) / (n + 1.0))
            }
            Some(current) => {
                let w = self.window as f64;
                match self.history.pop_front() {
                    Some(oldest) => Coordinate::new(
                        current.backness + (coordinate.backness - oldest.backness) / w,
                        current.height + (coordinate.height - oldest.height) / w,
                    ),
                    None => coordinate,
                }
            }
        };
        self.history.push_back(coordinate);
        self.smoothed = Some(next);
        next
    }

    /// `None` until the first coordinate arrives.
    pub fn current(&self) -> Option<Coordinate> {
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.smoothed = None;
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Changing the window discards the history so it never exceeds the bound.
    pub fn set_window(&mut self, window: usize) {
        let window = window.max(1);
        if window != self.window {
            self.window = window;
            self.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Coordinate> {
        self.history.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn c(backness: f64, height: f64) -> Coordinate {
        Coordinate::new(backness, height)
    }

    fn mean(values: &[Coordinate]) -> Coordinate {
        let n = values.len() as f64;
        c(
            values.iter().map(|v| v.backness).sum::<f64>() / n,
            values.iter().map(|v| v.height).sum::<f64>() / n,
        )
    }

    fn close(a: Coordinate, b: Coordinate) -> bool {
        (a.backness - b.backness).abs() < EPS && (a.height - b.height).abs() < EPS
    }

    /// A deterministic, irregular sequence.
    fn sequence(len: usize) -> Vec<Coordinate> {
        (0..len)
            .map(|i| {
                let x = i as f64;
                c((x * 0.37).sin() * 2.0 + 2.0, (x * 0.61).cos() * 1.5 + 1.5)
            })
            .collect()
    }

    #[test]
    fn empty_until_first_push() {
        let mut s = PositionSmoother::new(4);
        assert!(s.current().is_none());
        assert!(s.is_empty());
        assert_eq!(s.push(c(1.0, 2.0)), c(1.0, 2.0));
        assert_eq!(s.current(), Some(c(1.0, 2.0)));
    }

    #[test]
    fn identical_inputs_are_a_fixed_point() {
        for window in 1..=12 {
            let mut s = PositionSmoother::new(window);
            let value = c(1.25, 0.75);
            for _ in 0..window {
                s.push(value);
            }
            assert_eq!(s.current(), Some(value), "window {window}");
        }
    }

    #[test]
    fn warm_up_is_arithmetic_mean() {
        let values = sequence(7);
        let mut s = PositionSmoother::new(10);
        for (i, v) in values.iter().enumerate() {
            let got = s.push(*v);
            assert!(close(got, mean(&values[..=i])), "after {} pushes", i + 1);
        }
    }

    #[test]
    fn sliding_window_tracks_the_last_w() {
        let window = 5;
        let values = sequence(40);
        let mut s = PositionSmoother::new(window);
        for (i, v) in values.iter().enumerate() {
            let got = s.push(*v);
            let start = (i + 1).saturating_sub(window);
            assert!(close(got, mean(&values[start..=i])), "after {} pushes", i + 1);
        }
    }

    #[test]
    fn first_sliding_step_removes_oldest_share() {
        let mut s = PositionSmoother::new(2);
        s.push(c(0.0, 0.0));
        s.push(c(2.0, 4.0));
        assert_eq!(s.current(), Some(c(1.0, 2.0)));
        // (0,0) leaves with weight 1/2.
        assert_eq!(s.push(c(4.0, 8.0)), c(3.0, 6.0));
        let kept: Vec<_> = s.history().copied().collect();
        assert_eq!(kept, vec![c(2.0, 4.0), c(4.0, 8.0)]);
    }

    #[test]
    fn history_never_exceeds_window() {
        let mut s = PositionSmoother::new(3);
        for v in sequence(20) {
            s.push(v);
            assert!(s.len() <= 3);
        }
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn reset_matches_fresh_smoother() {
        let values = sequence(25);
        let mut used = PositionSmoother::new(6);
        for v in sequence(13).iter().rev() {
            used.push(*v);
        }
        used.reset();
        assert!(used.current().is_none());

        let mut fresh = PositionSmoother::new(6);
        for v in &values {
            assert_eq!(used.push(*v), fresh.push(*v));
        }
    }

    #[test]
    fn window_one_follows_input() {
        let mut s = PositionSmoother::new(0);
        assert_eq!(s.window(), 1);
        for v in sequence(5) {
            assert!(close(s.push(v), v));
        }
    }

    #[test]
    fn changing_window_resets() {
        let mut s = PositionSmoother::new(4);
        s.push(c(1.0, 1.0));
        s.set_window(4);
        assert_eq!(s.len(), 1);
        s.set_window(2);
        assert_eq!(s.window(), 2);
        assert!(s.current().is_none());
    }
}
