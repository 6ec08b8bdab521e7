//! Path segments identifying backend operations.

/// Anything that names a backend operation.
///
/// The returned string is appended verbatim to the configured base URL, so it
/// should not start with `/`.
pub trait EndpointRepresentable {
    fn endpoint_string(&self) -> String;
}

impl EndpointRepresentable for str {
    fn endpoint_string(&self) -> String {
        self.to_string()
    }
}

impl EndpointRepresentable for String {
    fn endpoint_string(&self) -> String {
        self.clone()
    }
}

impl<T: EndpointRepresentable + ?Sized> EndpointRepresentable for &T {
    fn endpoint_string(&self) -> String {
        (**self).endpoint_string()
    }
}
