use serde::{Deserialize, Serialize};

/// Continuation token for paginated range reads.
///
/// `Start` anchors the first page of the canonical (descending) order;
/// `Forward(p)` continues past `p` in the canonical direction; `Backward(p)`
/// pages back toward the head of the order; `End` means there is nothing
/// further in that direction.
///
/// On the wire this was historically a single signed integer (`-1` for
/// start, `0` for end, a negated magnitude for backward paging). The tagged
/// form keeps position and direction separate; `to_i64`/`from_i64` retain
/// the legacy encoding for interchange. The legacy encoding assumes
/// positions are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cursor {
    Start,
    End,
    Forward(i64),
    Backward(i64),
}

impl Cursor {
    pub fn is_end(self) -> bool {
        self == Cursor::End
    }

    /// The position this cursor anchors at. `Start` compares above every
    /// stored position.
    pub fn magnitude(self) -> i64 {
        match self {
            Cursor::Start => i64::MAX,
            Cursor::End => 0,
            Cursor::Forward(position) | Cursor::Backward(position) => position,
        }
    }

    pub fn to_i64(self) -> i64 {
        match self {
            Cursor::Start => -1,
            Cursor::End => 0,
            Cursor::Forward(position) => position,
            Cursor::Backward(position) => -position,
        }
    }

    pub fn from_i64(raw: i64) -> Self {
        match raw {
            0 => Cursor::End,
            -1 => Cursor::Start,
            position if position > 0 => Cursor::Forward(position),
            position => Cursor::Backward(-position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip() {
        let cases = [
            Cursor::Start,
            Cursor::End,
            Cursor::Forward(1000),
            Cursor::Backward(1000),
            Cursor::Forward(2),
        ];
        for cursor in cases {
            assert_eq!(Cursor::from_i64(cursor.to_i64()), cursor);
        }
    }

    #[test]
    fn sentinels() {
        assert_eq!(Cursor::from_i64(0), Cursor::End);
        assert_eq!(Cursor::from_i64(-1), Cursor::Start);
        assert_eq!(Cursor::from_i64(-42), Cursor::Backward(42));
        assert!(Cursor::End.is_end());
        assert!(!Cursor::Start.is_end());
    }

    #[test]
    fn start_compares_above_everything() {
        assert_eq!(Cursor::Start.magnitude(), i64::MAX);
        assert_eq!(Cursor::Forward(7).magnitude(), 7);
        assert_eq!(Cursor::Backward(7).magnitude(), 7);
    }
}
