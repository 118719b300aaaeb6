//! 误差滤波器
//!
//! 固定长度的环形缓冲区，输出最近 N 个原始误差的算术平均。
//!
//! 未预热时缺失的槽位按 0 处理（均值始终除以 N），
//! 所以前 N-1 个周期的平滑误差会偏向 0。

/// 控制循环使用的误差历史长度
pub const ERROR_HISTORY_LEN: usize = 3;

/// 滑动平均滤波器
#[derive(Debug, Clone, PartialEq)]
pub struct RollingAverage<const N: usize> {
    samples: [f64; N],
    next: usize,
}

/// 控制单元的误差历史
pub type ErrorHistory = RollingAverage<ERROR_HISTORY_LEN>;

impl<const N: usize> RollingAverage<N> {
    pub const fn new() -> Self {
        Self {
            samples: [0.0; N],
            next: 0,
        }
    }

    /// 写入一个样本（覆盖最旧的样本），返回新的平均值
    pub fn push(&mut self, sample: f64) -> f64 {
        self.samples[self.next] = sample;
        self.next = (self.next + 1) % N;
        self.mean()
    }

    pub fn mean(&self) -> f64 {
        self.samples.iter().sum::<f64>() / N as f64
    }

    /// 清空历史
    pub fn clear(&mut self) {
        self.samples = [0.0; N];
        self.next = 0;
    }
}

impl<const N: usize> Default for RollingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}
