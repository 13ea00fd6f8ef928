//! Per-hop timing statistics.

use sonda_common::HopStats;

/// Compute hop statistics from the observed round-trip times and the number
/// of packets sent. `loss` is derived from sent vs received; `jAvg` is the
/// mean absolute difference between consecutive RTTs.
pub fn hop_stats(rtts: &[f64], sent: u32) -> HopStats {
    let count = rtts.len() as u32;
    if count == 0 {
        return HopStats {
            loss: if sent > 0 { 100.0 } else { 0.0 },
            ..HopStats::default()
        };
    }

    let min = rtts.iter().copied().fold(f64::INFINITY, f64::min);
    let max = rtts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = rtts.iter().sum::<f64>() / count as f64;

    let variance = rtts.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / count as f64;
    let st_dev = variance.sqrt();

    let j_avg = if count > 1 {
        rtts.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>() / (count - 1) as f64
    } else {
        0.0
    };

    let loss = if sent > count {
        (sent - count) as f64 / sent as f64 * 100.0
    } else {
        0.0
    };

    HopStats {
        min: round2(min),
        avg: round2(avg),
        max: round2(max),
        st_dev: round2(st_dev),
        j_avg: round2(j_avg),
        loss: round2(loss),
        count,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_basic() {
        let stats = hop_stats(&[1.0, 2.0, 3.0], 3);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.avg, 2.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.j_avg, 1.0);
        assert_eq!(stats.loss, 0.0);
        assert_eq!(stats.count, 3);
    }

    #[test]
    fn test_stats_loss() {
        let stats = hop_stats(&[5.0], 4);
        assert_eq!(stats.loss, 75.0);
        assert_eq!(stats.count, 1);
    }

    #[test]
    fn test_stats_all_lost() {
        let stats = hop_stats(&[], 3);
        assert_eq!(stats.loss, 100.0);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg, 0.0);
    }

    #[test]
    fn test_stats_no_packets() {
        let stats = hop_stats(&[], 0);
        assert_eq!(stats.loss, 0.0);
    }

    #[test]
    fn test_single_sample_has_zero_spread() {
        let stats = hop_stats(&[7.5], 1);
        assert_eq!(stats.min, 7.5);
        assert_eq!(stats.max, 7.5);
        assert_eq!(stats.st_dev, 0.0);
        assert_eq!(stats.j_avg, 0.0);
    }
}
