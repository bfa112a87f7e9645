use std::any::Any;

/// Trait for errors that may be returned by templating collaborators or by the runner. This just
/// sets up the trait bounds that are required, since we'll typically only expose rather opaque
/// boxed error types at those seams.
pub trait BuildError: std::error::Error + Send + Sync + 'static + Any {
    fn as_any(&self) -> &dyn Any;
}
impl<T> BuildError for T
where
    T: std::error::Error + Send + Sync + 'static + Any,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub type Error = Box<dyn BuildError>;

impl dyn BuildError {
    /// convenience function for downcasting the error to a concrete type
    pub fn as_type<T: BuildError>(&self) -> Option<&T> {
        let as_any = self.as_any();
        as_any.downcast_ref::<T>()
    }

    /// convenience function for checking whether the error is of the given concrete type.
    /// If `is_type::<MyType>()` returns true, then calling `as_type::<MyType>()` will return
    /// `Some`.
    pub fn is_type<T: BuildError>(&self) -> bool {
        let as_any = self.as_any();
        as_any.is::<T>()
    }
}

impl<T> From<T> for Error
where
    T: BuildError,
{
    fn from(e: T) -> Error {
        Box::new(e)
    }
}

/// Wraps an `anyhow::Error` from the input loading edge so it can travel as an `Error`
#[derive(Debug)]
pub struct InputError(pub anyhow::Error);

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Invalid build input: {:#}", self.0)
    }
}

impl std::error::Error for InputError {}
