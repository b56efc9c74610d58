use crate::codec::{
    Code, MARKER_DURATION_INF, MARKER_DURATION_MINUS_INF, MARKER_DURATION_UNDEFINED,
};
use crate::*;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A time span that may be infinite or undefined.
///
/// Finite spans are a signed nanosecond count, pickled as a coded long. The three non-finite
/// values are pickled as reserved markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Duration {
    /// A finite span in nanoseconds.
    Finite(i64),
    Inf,
    MinusInf,
    Undefined,
}

impl Duration {
    pub const ZERO: Duration = Duration::Finite(0);

    pub fn from_nanos(nanos: i64) -> Self {
        Duration::Finite(nanos)
    }

    /// Returns `None` if the span overflows `i64` nanoseconds.
    pub fn from_secs(secs: i64) -> Option<Self> {
        secs.checked_mul(NANOS_PER_SEC).map(Duration::Finite)
    }

    pub fn from_millis(millis: i64) -> Option<Self> {
        millis.checked_mul(1_000_000).map(Duration::Finite)
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, Duration::Finite(_))
    }

    pub fn as_nanos(&self) -> Option<i64> {
        match self {
            Duration::Finite(nanos) => Some(*nanos),
            _ => None,
        }
    }

    /// Converts to a `std::time::Duration` if the span is finite and non-negative.
    pub fn to_std(&self) -> Option<std::time::Duration> {
        let nanos = u64::try_from(self.as_nanos()?).ok()?;
        Some(std::time::Duration::from_nanos(nanos))
    }

    /// Converts from a `std::time::Duration`. Returns `None` past `i64::MAX` nanoseconds.
    pub fn from_std(duration: std::time::Duration) -> Option<Self> {
        i64::try_from(duration.as_nanos()).ok().map(Duration::Finite)
    }

    pub(crate) fn write_to(self, enc: &mut Encoder) {
        match self {
            Duration::Finite(nanos) => enc.write_long(nanos),
            Duration::Inf => enc.write_marker(MARKER_DURATION_INF),
            Duration::MinusInf => enc.write_marker(MARKER_DURATION_MINUS_INF),
            Duration::Undefined => enc.write_marker(MARKER_DURATION_UNDEFINED),
        }
    }

    fn from_marker(marker: u8) -> Option<Self> {
        match marker {
            MARKER_DURATION_INF => Some(Duration::Inf),
            MARKER_DURATION_MINUS_INF => Some(Duration::MinusInf),
            MARKER_DURATION_UNDEFINED => Some(Duration::Undefined),
            _ => None,
        }
    }
}

impl Pickler for Duration {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        self.write_to(state.encoder());
        Ok(())
    }
}

impl Unpickler for Duration {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        match state.decoder().read_long_code()? {
            Code::Value(nanos) => Ok(Duration::Finite(nanos)),
            Code::Marker(marker) => {
                Duration::from_marker(marker).ok_or(PickleError::UnknownMarker {
                    type_name: "Duration",
                    marker,
                })
            }
        }
    }
}

/// `std::time::Duration` shares the wire form of a finite [`Duration`].
impl Pickler for std::time::Duration {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        let nanos = i64::try_from(self.as_nanos()).map_err(|_| {
            PickleError::Encode(format!("Duration {:?} overflows i64 nanoseconds", self))
        })?;
        state.encoder().write_long(nanos);
        Ok(())
    }
}

impl Unpickler for std::time::Duration {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        match Duration::unpickle(state)? {
            Duration::Finite(nanos) => u64::try_from(nanos)
                .map(std::time::Duration::from_nanos)
                .map_err(|_| {
                    PickleError::Decode(format!(
                        "Negative duration {}ns for std::time::Duration",
                        nanos
                    ))
                }),
            other => Err(PickleError::Decode(format!(
                "{:?} is not representable as std::time::Duration",
                other
            ))),
        }
    }
}
