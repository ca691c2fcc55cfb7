//! Purpose: `time` capability module.
use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::core::error::Error;
use crate::core::object::{Module, NativeFunction};
use crate::core::value::Value;

static MONOTONIC_ORIGIN: OnceLock<Instant> = OnceLock::new();

pub(crate) fn module() -> Module {
    MONOTONIC_ORIGIN.get_or_init(Instant::now);
    Module::new("time")
        .with_function(NativeFunction::new("time.time", &[], |_| {
            let elapsed = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO);
            Ok(Value::Float(elapsed.as_secs_f64()))
        }))
        .with_function(NativeFunction::new("time.monotonic", &[], |_| {
            let origin = MONOTONIC_ORIGIN.get_or_init(Instant::now);
            Ok(Value::Float(origin.elapsed().as_secs_f64()))
        }))
        .with_function(NativeFunction::new("time.sleep", &["seconds"], |args| {
            let seconds: f64 = args.required("seconds")?;
            if !seconds.is_finite() {
                return Err(Error::value_error("sleep length must be finite"));
            }
            if seconds < 0.0 {
                return Err(Error::value_error("sleep length must be non-negative"));
            }
            let length = Duration::try_from_secs_f64(seconds).map_err(|_| {
                Error::raised("OverflowError").with_message("sleep length is too large")
            })?;
            std::thread::sleep(length);
            Ok(Value::None)
        }))
}

#[cfg(test)]
mod tests {
    use super::module;
    use crate::core::object::{CallArgs, Object};
    use crate::core::value::Value;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, crate::core::error::Error> {
        module()
            .get_attr(name)
            .expect("function")
            .as_object()
            .expect("callable")
            .call(CallArgs::positional(args))
    }

    #[test]
    fn monotonic_never_goes_backwards() {
        let Value::Float(first) = call("monotonic", Vec::new()).expect("first") else {
            panic!("expected float");
        };
        call("sleep", vec![Value::Float(0.001)]).expect("sleep");
        let Value::Float(second) = call("monotonic", Vec::new()).expect("second") else {
            panic!("expected float");
        };
        assert!(second >= first);
    }

    #[test]
    fn sleep_rejects_negative_lengths() {
        let err = call("sleep", vec![Value::Int(-1)]).unwrap_err();
        assert_eq!(err.category(), "ValueError");
        let err = call("sleep", vec![Value::Float(1e30)]).unwrap_err();
        assert_eq!(err.category(), "OverflowError");
    }

    #[test]
    fn wall_clock_is_after_the_epoch() {
        assert!(matches!(call("time", Vec::new()), Ok(Value::Float(now)) if now > 0.0));
    }
}
