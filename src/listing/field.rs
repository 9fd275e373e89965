/// A response attribute that may be missing, explicitly null, or set
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Field<T> {
    /// The key was not in the response
    #[default]
    Absent,

    /// The key was present with a null value
    Null,

    /// The key was present with a value
    Value(T),
}

impl<T> Field<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Self::Absent => Field::Absent,
            Self::Null => Field::Null,
            Self::Value(v) => Field::Value(f(v)),
        }
    }

    /// Keeps `self` unless it is absent, in which case `other` is used
    pub fn or(self, other: Field<T>) -> Field<T> {
        match self {
            Self::Absent => other,
            present => present,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Value(v),
            None => Self::Null,
        }
    }
}
