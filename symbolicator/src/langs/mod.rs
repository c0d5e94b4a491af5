use crate::error::SymbolicationError;

pub mod java;
pub mod js;

// A single output frame produced by symbolication. One input frame may map to
// several of these when the compiler inlined calls; order is preserved. For
// java frames `name` is the fully qualified `class.method` and `column` is
// unused.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedFrame {
    pub name: String,
    pub source: String,
    pub line: i64,
    pub column: i64,
}

// Stack traces index lines and columns with 32-bit unsigned ints; anything
// outside that range is corrupt input, not a fetch problem, and is never
// cached.
pub(crate) fn validate_position(line: i64, column: i64) -> Result<(u32, u32), SymbolicationError> {
    let line = u32::try_from(line).map_err(|_| SymbolicationError::InvalidLine(line))?;
    let column = u32::try_from(column).map_err(|_| SymbolicationError::InvalidColumn(column))?;
    Ok((line, column))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn positions_outside_u32_fail_validation() {
        assert!(validate_position(0, 0).is_ok());
        assert!(validate_position(u32::MAX as i64, 12).is_ok());
        assert!(matches!(
            validate_position(-1, 0),
            Err(SymbolicationError::InvalidLine(-1))
        ));
        assert!(matches!(
            validate_position(0, u32::MAX as i64 + 1),
            Err(SymbolicationError::InvalidColumn(_))
        ));
    }
}
