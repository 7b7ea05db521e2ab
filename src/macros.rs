/// Sends an update across to the other side of a channel.
///
/// A closed channel only means the receiving side is shutting down,
/// so it's logged rather than treated as an error.
#[macro_export]
macro_rules! emit {
    ($tx:expr, $data:expr) => {
        if $tx.send($data.into()).is_err() {
            ::tracing::debug!("Receiver closed, dropped update: {}", stringify!($data));
        }
    };
}
