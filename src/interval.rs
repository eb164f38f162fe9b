use serde::{Deserialize, Serialize};

/// Unix milliseconds, the unit every overlap check runs on.
pub type Ms = i64;

/// Half-open overlap test: `[a_start, a_end)` and `[b_start, b_end)` intersect
/// iff `a_start < b_end && b_start < a_end`. Empty or inverted intervals never
/// overlap anything, themselves included.
pub fn overlaps<T: Ord>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// The one-millisecond span starting at `t`.
    pub fn instant(t: Ms) -> Self {
        Self { start: t, end: t + 1 }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Items from `sorted` (ascending by span start) whose span overlaps `window`.
/// Binary search skips everything starting at or after `window.end`.
pub fn overlapping<'a, T, F>(sorted: &'a [T], window: Span, span_of: F) -> impl Iterator<Item = &'a T>
where
    F: Fn(&T) -> Span + Copy + 'a,
{
    let right_bound = if window.is_empty() {
        0
    } else {
        sorted.partition_point(|item| span_of(item).start < window.end)
    };
    sorted[..right_bound]
        .iter()
        .filter(move |item| span_of(*item).end > window.start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_points_do_not_overlap() {
        assert!(!overlaps(0, 10, 10, 20));
        assert!(!overlaps(10, 20, 0, 10));
        assert!(overlaps(0, 10, 9, 20));
    }

    #[test]
    fn overlap_is_symmetric() {
        let points = [-5i64, 0, 3, 7, 10, 15];
        for &a0 in &points {
            for &a1 in &points {
                for &b0 in &points {
                    for &b1 in &points {
                        assert_eq!(
                            overlaps(a0, a1, b0, b1),
                            overlaps(b0, b1, a0, a1),
                            "[{a0},{a1}) vs [{b0},{b1})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn self_overlap_iff_non_empty() {
        for (s, e) in [(0i64, 10), (5, 5), (10, 0), (-3, -2)] {
            assert_eq!(overlaps(s, e, s, e), s < e, "[{s},{e})");
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
        assert!(Span::try_new(5, 5).is_none());
        assert!(Span::try_new(6, 5).is_none());
        assert!(Span::instant(7).contains_instant(7));
    }

    #[test]
    fn overlapping_scan_respects_order_and_bounds() {
        let sorted = vec![
            Span::new(0, 100),
            Span::new(50, 250),
            Span::new(200, 300),
            Span::new(300, 400),
            Span::new(1000, 1100),
        ];
        let hits: Vec<_> = overlapping(&sorted, Span::new(200, 300), |s| *s).copied().collect();
        assert_eq!(hits, vec![Span::new(50, 250), Span::new(200, 300)]);
    }

    #[test]
    fn overlapping_zero_length_window_is_empty() {
        let sorted = vec![Span::new(0, 1000)];
        assert_eq!(overlapping(&sorted, Span::new(500, 500), |s| *s).count(), 0);
        assert_eq!(overlapping(&sorted, Span::new(600, 500), |s| *s).count(), 0);
    }

    #[test]
    fn overlapping_large_interval_spanning_window() {
        let sorted = vec![Span::new(0, 10_000)];
        assert_eq!(overlapping(&sorted, Span::new(500, 600), |s| *s).count(), 1);
    }
}
