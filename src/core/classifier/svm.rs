//! L1-loss 线性 SVM，对偶坐标下降求解
//!
//! 样本按固定顺序遍历，没有随机打乱，同一份数据总是得到同一组权重。
//! 偏置作为恒为 1 的附加特征参与正则化。

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvmParams {
    pub c: f64,
    pub max_iter: usize,
    pub eps: f64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            eps: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LinearModel {
    pub fn decision(&self, x: &[f32]) -> f64 {
        decision(&self.weights, self.bias, x)
    }
}

pub fn decision(weights: &[f64], bias: f64, x: &[f32]) -> f64 {
    dot(weights, x) + bias
}

fn dot(w: &[f64], x: &[f32]) -> f64 {
    w.iter().zip(x).map(|(a, &b)| a * b as f64).sum()
}

/// `ys` 取值 +1 / -1
pub fn train_binary(xs: &[&[f32]], ys: &[f64], params: &SvmParams) -> LinearModel {
    let dim = xs.first().map(|x| x.len()).unwrap_or(0);
    let mut weights = vec![0.0f64; dim];
    let mut bias = 0.0f64;
    let mut alpha = vec![0.0f64; xs.len()];
    let diag: Vec<f64> = xs
        .iter()
        .map(|x| x.iter().map(|&v| v as f64 * v as f64).sum::<f64>() + 1.0)
        .collect();

    let mut iterations = 0;
    for _ in 0..params.max_iter {
        iterations += 1;
        let mut pg_max = f64::NEG_INFINITY;
        let mut pg_min = f64::INFINITY;

        for (i, x) in xs.iter().enumerate() {
            let y = ys[i];
            let g = y * (dot(&weights, x) + bias) - 1.0;
            let pg = if alpha[i] == 0.0 {
                g.min(0.0)
            } else if alpha[i] >= params.c {
                g.max(0.0)
            } else {
                g
            };
            pg_max = pg_max.max(pg);
            pg_min = pg_min.min(pg);

            if pg.abs() > 1e-12 {
                let old = alpha[i];
                alpha[i] = (old - g / diag[i]).clamp(0.0, params.c);
                let delta = (alpha[i] - old) * y;
                for (w, &v) in weights.iter_mut().zip(x.iter()) {
                    *w += delta * v as f64;
                }
                bias += delta;
            }
        }

        if pg_max - pg_min < params.eps {
            break;
        }
    }
    debug!("📐 dual coordinate descent stopped after {} passes", iterations);

    LinearModel { weights, bias }
}
