use super::fanout_cfg_types::*;
use super::EnvVar;
use crate::delivery::RetryPolicy;
use crate::err::FatalErr;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Fanout {
    pub workers: Workers,
    pub queue_capacity: QueueCapacity,
    pub overflow: Overflow,
    pub delivery_timeout: DeliveryTimeout,
    pub retry_base: RetryBase,
    pub retry_max: RetryMax,
    pub max_attempts: MaxAttempts,
    pub retry_jitter: RetryJitter,
    pub stream_buffer: StreamBuffer,
}

impl Fanout {
    const BACKOFF_WARNING: &'static str =
        "FANOUT_RETRY_BASE is longer than FANOUT_RETRY_MAX; every retry will wait FANOUT_RETRY_MAX";

    pub(crate) fn from_env(env: EnvVar) -> Result<Self, FatalErr> {
        let cfg = Self {
            workers: Workers::default().maybe_update(env.get(Workers::ENV_VAR))?,
            queue_capacity: QueueCapacity::default().maybe_update(env.get(QueueCapacity::ENV_VAR))?,
            overflow: Overflow::default().maybe_update(env.get(Overflow::ENV_VAR))?,
            delivery_timeout: DeliveryTimeout::default()
                .maybe_update(env.get(DeliveryTimeout::ENV_VAR))?,
            retry_base: RetryBase::default().maybe_update(env.get(RetryBase::ENV_VAR))?,
            retry_max: RetryMax::default().maybe_update(env.get(RetryMax::ENV_VAR))?,
            max_attempts: MaxAttempts::default().maybe_update(env.get(MaxAttempts::ENV_VAR))?,
            retry_jitter: RetryJitter::default().maybe_update(env.get(RetryJitter::ENV_VAR))?,
            stream_buffer: StreamBuffer::default().maybe_update(env.get(StreamBuffer::ENV_VAR))?,
        };

        if *cfg.retry_base > *cfg.retry_max {
            log::warn!("{}", Self::BACKOFF_WARNING);
        }
        log::warn!("Using fan-out configuration:\n {:#?}", &cfg);
        Ok(cfg)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base: *self.retry_base,
            max_backoff: *self.retry_max,
            max_attempts: *self.max_attempts,
            jitter: *self.retry_jitter,
        }
    }
}
