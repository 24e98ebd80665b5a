//! 区间合并与过滤
//!
//! - offset：两个稳定区间之间的不稳定间隔 `b.start - a.end <= offset` 时合并，从左到右逐对判断
//! - limit：合并后长度 `end - start < limit` 的稳定区间不参与采样和分类

use super::range::Range;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRanges {
    pub stable: Vec<Range>,
    pub unstable: Vec<Range>,
}

pub fn merge(ranges: &[Range], offset: u64, limit: u64) -> MergedRanges {
    let mut stable: Vec<Range> = Vec::new();
    let mut unstable = Vec::new();
    // 上一个稳定区间之后尚未确定归属的不稳定区间
    let mut pending: Vec<Range> = Vec::new();

    for range in ranges {
        if !range.is_stable {
            pending.push(*range);
            continue;
        }

        let bridged = match stable.last() {
            Some(prev) => range.start.saturating_sub(prev.end) <= offset,
            None => false,
        };

        if bridged {
            if let Some(prev) = stable.pop() {
                debug!(
                    "🔗 bridging [{}, {}] and [{}, {}] over {} unstable range(s)",
                    prev.start,
                    prev.end,
                    range.start,
                    range.end,
                    pending.len()
                );
                stable.push(prev.merged_with(range));
            }
            pending.clear();
        } else {
            unstable.append(&mut pending);
            stable.push(*range);
        }
    }
    unstable.append(&mut pending);

    let before = stable.len();
    stable.retain(|r| r.len() >= limit);
    if stable.len() != before {
        debug!(
            "✂️ dropped {} stable range(s) shorter than {}",
            before - stable.len(),
            limit
        );
    }

    MergedRanges { stable, unstable }
}
