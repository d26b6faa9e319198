use anyhow::Result;
use async_trait::async_trait;

/// 负载因子提供者接口
///
/// 广播器每个通告周期调用一次，返回 [0.0, 1.0] 区间的负载值。
/// 实现不应长时间阻塞；超出配置时限的调用会被放弃并沿用上一次的值。
#[async_trait]
pub trait LoadFactorProvider: Send + Sync {
    async fn current_load(&self) -> Result<f64>;
}

/// 固定负载因子提供者
/// 用于测试和没有自定义负载计算的部署
pub struct FixedLoadProvider {
    value: f64,
}

impl FixedLoadProvider {
    pub fn new(value: f64) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl LoadFactorProvider for FixedLoadProvider {
    async fn current_load(&self) -> Result<f64> {
        Ok(self.value)
    }
}
