//! Built-in applications.

use crate::drop::{AppContext, Application, DEFAULT_CHUNK_SIZE, copy_drop_contents};
use crate::error::{DropflowError, Result};
use crate::spec::DropSpec;
use std::time::Duration;
use tracing::trace;

/// Concatenates every input into every output.
#[derive(Debug, Default)]
pub struct CopyApp;

impl Application for CopyApp {
    fn run(&self, ctx: &AppContext) -> Result<()> {
        copy_all(ctx)
    }
}

/// Sleeps for a fixed time.
#[derive(Debug)]
pub struct SleepApp {
    sleep: Duration,
}

impl SleepApp {
    /// Sleep for `sleep` when run.
    pub fn new(sleep: Duration) -> Self {
        Self { sleep }
    }
}

impl Application for SleepApp {
    fn run(&self, ctx: &AppContext) -> Result<()> {
        trace!(oid = %ctx.oid(), sleep_ms = self.sleep.as_millis() as u64, "Sleeping");
        std::thread::sleep(self.sleep);
        Ok(())
    }
}

/// Sleeps, then copies like [`CopyApp`].
#[derive(Debug)]
pub struct SleepAndCopyApp {
    sleep: Duration,
}

impl SleepAndCopyApp {
    /// Sleep for `sleep` before copying.
    pub fn new(sleep: Duration) -> Self {
        Self { sleep }
    }
}

impl Application for SleepAndCopyApp {
    fn run(&self, ctx: &AppContext) -> Result<()> {
        std::thread::sleep(self.sleep);
        copy_all(ctx)
    }
}

/// Does nothing; useful as a join point.
#[derive(Debug, Default)]
pub struct BarrierApp;

impl Application for BarrierApp {
    fn run(&self, _ctx: &AppContext) -> Result<()> {
        Ok(())
    }
}

fn copy_all(ctx: &AppContext) -> Result<()> {
    for output in ctx.outputs() {
        for input in ctx.inputs() {
            copy_drop_contents(input, output, DEFAULT_CHUNK_SIZE)?;
        }
    }
    Ok(())
}

/// `sleep_time` in seconds, defaulting to zero.
fn sleep_time(spec: &DropSpec) -> Result<Duration> {
    let Some(raw) = spec.param("sleep_time") else {
        return Ok(Duration::ZERO);
    };
    let invalid = |cause: String| DropflowError::InvalidParameter {
        oid: spec.oid().clone(),
        param: "sleep_time",
        cause,
    };
    let secs = spec
        .param_f64("sleep_time")
        .ok_or_else(|| invalid(format!("expected seconds, found {raw}")))?;
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(e.to_string()))
}

pub(crate) fn copy_factory(_spec: &DropSpec) -> Result<Box<dyn Application>> {
    Ok(Box::new(CopyApp))
}

pub(crate) fn sleep_factory(spec: &DropSpec) -> Result<Box<dyn Application>> {
    Ok(Box::new(SleepApp::new(sleep_time(spec)?)))
}

pub(crate) fn sleep_and_copy_factory(spec: &DropSpec) -> Result<Box<dyn Application>> {
    Ok(Box::new(SleepAndCopyApp::new(sleep_time(spec)?)))
}

pub(crate) fn barrier_factory(_spec: &DropSpec) -> Result<Box<dyn Application>> {
    Ok(Box::new(BarrierApp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_time_defaults_to_zero() {
        let spec = DropSpec::app("S", "sleep");
        assert_eq!(sleep_time(&spec).unwrap(), Duration::ZERO);
    }

    #[test]
    fn sleep_time_accepts_numbers_and_strings() {
        let spec = DropSpec::app("S", "sleep").with_param("sleep_time", 0.25);
        assert_eq!(sleep_time(&spec).unwrap(), Duration::from_millis(250));
        let spec = DropSpec::app("S", "sleep").with_param("sleep_time", "2");
        assert_eq!(sleep_time(&spec).unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn negative_sleep_time_is_rejected() {
        let spec = DropSpec::app("S", "sleep").with_param("sleep_time", -1.0);
        let err = sleep_factory(&spec).err().unwrap();
        assert!(matches!(
            err,
            DropflowError::InvalidParameter {
                param: "sleep_time",
                ..
            }
        ));
    }
}
