use crate::core::error::{Result, StageError};
use serde::{Deserialize, Serialize};

/// 连续帧区间。相邻区间共享边界帧：`next.start == prev.end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: u64,
    pub end: u64,
    pub is_stable: bool,
}

impl Range {
    pub fn stable(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            is_stable: true,
        }
    }

    pub fn unstable(start: u64, end: u64) -> Self {
        Self {
            start,
            end,
            is_stable: false,
        }
    }

    /// 区间长度 = end - start
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn frame_span(&self) -> u64 {
        self.end - self.start + 1
    }

    /// 合并为新的区间，不修改自身
    pub fn merged_with(&self, other: &Range) -> Range {
        Range {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            is_stable: self.is_stable,
        }
    }
}

/// 相邻两帧的相似度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapScore {
    pub from: u64,
    pub to: u64,
    pub score: f64,
}

impl GapScore {
    pub fn is_stable(&self, threshold: f64) -> bool {
        self.score >= threshold
    }
}

/// 区间检测状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectState {
    Idle,
    InStable { start: u64 },
    InUnstable { start: u64 },
}

impl DetectState {
    fn open(stable: bool, start: u64) -> DetectState {
        if stable {
            DetectState::InStable { start }
        } else {
            DetectState::InUnstable { start }
        }
    }

    /// 类别变化时关闭当前区间并开启新区间
    pub fn transition(&self, gap: &GapScore, threshold: f64) -> (DetectState, Option<Range>) {
        let stable = gap.is_stable(threshold);
        match *self {
            DetectState::Idle => (Self::open(stable, gap.from), None),
            DetectState::InStable { .. } if stable => (*self, None),
            DetectState::InStable { start } => (
                DetectState::InUnstable { start: gap.from },
                Some(Range::stable(start, gap.from)),
            ),
            DetectState::InUnstable { .. } if !stable => (*self, None),
            DetectState::InUnstable { start } => (
                DetectState::InStable { start: gap.from },
                Some(Range::unstable(start, gap.from)),
            ),
        }
    }

    pub fn flush(&self, end: u64) -> Option<Range> {
        match *self {
            DetectState::Idle => None,
            DetectState::InStable { start } => Some(Range::stable(start, end)),
            DetectState::InUnstable { start } => Some(Range::unstable(start, end)),
        }
    }
}

/// 把逐对分数合并为连续区间。分数必须首尾相接。
pub fn coalesce<'a>(
    gaps: impl IntoIterator<Item = &'a GapScore>,
    threshold: f64,
) -> Result<Vec<Range>> {
    let mut ranges = Vec::new();
    let mut state = DetectState::Idle;
    let mut last_end: Option<u64> = None;

    for gap in gaps {
        if gap.to != gap.from + 1 {
            return Err(StageError::Format(format!(
                "gap {}->{} does not join adjacent frames",
                gap.from, gap.to
            )));
        }
        if let Some(end) = last_end {
            if gap.from != end {
                return Err(StageError::Format(format!(
                    "score cache has a hole between frame {} and {}",
                    end, gap.from
                )));
            }
        }

        let (next, closed) = state.transition(gap, threshold);
        if let Some(range) = closed {
            ranges.push(range);
        }
        state = next;
        last_end = Some(gap.to);
    }

    if let Some(range) = last_end.and_then(|end| state.flush(end)) {
        ranges.push(range);
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaps(scores: &[f64]) -> Vec<GapScore> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &score)| GapScore {
                from: i as u64,
                to: i as u64 + 1,
                score,
            })
            .collect()
    }

    #[test]
    fn test_state_transitions() {
        let gap = GapScore {
            from: 4,
            to: 5,
            score: 0.5,
        };
        let (state, closed) = DetectState::InStable { start: 0 }.transition(&gap, 0.9);
        assert_eq!(state, DetectState::InUnstable { start: 4 });
        assert_eq!(closed, Some(Range::stable(0, 4)));

        let (state, closed) = state.transition(&gap, 0.9);
        assert_eq!(state, DetectState::InUnstable { start: 4 });
        assert_eq!(closed, None);
        assert_eq!(state.flush(9), Some(Range::unstable(4, 9)));
    }

    #[test]
    fn test_coalesce_runs() {
        let ranges = coalesce(&gaps(&[1.0, 0.99, 0.5, 0.4, 0.97, 1.0]), 0.95).unwrap();
        assert_eq!(
            ranges,
            vec![
                Range::stable(0, 2),
                Range::unstable(2, 4),
                Range::stable(4, 6)
            ]
        );
    }

    #[test]
    fn test_coalesce_covers_span() {
        let scores = [0.2, 0.99, 0.98, 0.1, 0.96, 0.3, 0.3, 1.0];
        for threshold in [0.0, 0.5, 0.97, 1.0] {
            let ranges = coalesce(&gaps(&scores), threshold).unwrap();
            assert_eq!(ranges.first().unwrap().start, 0);
            assert_eq!(ranges.last().unwrap().end, scores.len() as u64);
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
                assert_ne!(pair[0].is_stable, pair[1].is_stable);
            }
        }
    }

    #[test]
    fn test_threshold_equal_is_stable() {
        let ranges = coalesce(&gaps(&[0.95]), 0.95).unwrap();
        assert_eq!(ranges, vec![Range::stable(0, 1)]);
    }

    #[test]
    fn test_coalesce_rejects_hole() {
        let mut list = gaps(&[1.0, 1.0, 1.0]);
        list.remove(1);
        assert!(matches!(coalesce(&list, 0.9), Err(StageError::Format(_))));
    }

    #[test]
    fn test_merged_with_is_new_value() {
        let a = Range::stable(0, 10);
        let b = Range::stable(12, 20);
        let merged = a.merged_with(&b);
        assert_eq!(merged, Range::stable(0, 20));
        assert_eq!(a, Range::stable(0, 10));
        assert_eq!(merged.len(), 20);
        assert_eq!(merged.frame_span(), 21);
    }
}
