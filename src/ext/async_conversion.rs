/// Async counterpart to the standard library's `TryFrom<T>` trait.
///
/// Used for conversions that need I/O, such as loading a value from a file on
/// disk.
///
/// # Examples
///
/// ```rust,ignore
/// use std::path::Path;
///
/// struct Manifest(String);
///
/// impl AsyncTryFrom<&Path> for Manifest {
///     type Error = std::io::Error;
///
///     async fn async_try_from(path: &Path) -> Result<Self, Self::Error> {
///         let bytes = compio::fs::read(path).await?;
///         Ok(Manifest(String::from_utf8_lossy(&bytes).into_owned()))
///     }
/// }
/// ```
#[allow(async_fn_in_trait)]
pub trait AsyncTryFrom<T>: Sized {
    /// The error type that can occur during conversion.
    type Error;

    /// Performs the fallible asynchronous conversion from `T` to `Self`.
    async fn async_try_from(value: T) -> Result<Self, Self::Error>;
}
