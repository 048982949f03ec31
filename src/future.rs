/// An owned, dynamically typed [`Future`](std::future::Future), used by the
/// collaborator traits whose implementations live outside this crate.
pub type BoxFuture<'a, T> = futures::future::BoxFuture<'a, T>;
