//! Declarative macros to reduce boilerplate across the fmeperf codebase

/// Define a static group of FME event descriptors
///
/// Each entry is `name => (code, scope)` or `name => (code, scope, aux)`,
/// where `scope` is `device` for whole-device events or `port` for events
/// counted on one port, and `aux` is the per-event hardware data (the cache
/// channel). Entries without `aux` get 0.
///
/// # Example
/// ```
/// use fmeperf::event_group;
///
/// event_group! {
///     pub static DEMO_EVENTS: Fabric = [
///         "fab_pcie0_read" => (0x0, device),
///         "fab_port_pcie0_read" => (0x0, port),
///     ];
/// }
///
/// assert_eq!(DEMO_EVENTS.len(), 2);
/// assert!(DEMO_EVENTS[1].scoped);
/// ```
#[macro_export]
macro_rules! event_group {
    (@scoped device) => { false };
    (@scoped port) => { true };
    (@aux) => { 0 };
    (@aux $aux:expr) => { $aux };
    (
        $(#[$meta:meta])*
        $vis:vis static $group:ident: $ty:ident = [
            $($name:literal => ($code:expr, $scope:ident $(, $aux:expr)?)),* $(,)?
        ];
    ) => {
        $(#[$meta])*
        $vis static $group: &[$crate::counters::events::EventDescriptor] = &[
            $(
                $crate::counters::events::EventDescriptor {
                    name: $name,
                    event_code: $code,
                    event_type: $crate::counters::events::EventType::$ty,
                    scoped: $crate::event_group!(@scoped $scope),
                    aux_data: $crate::event_group!(@aux $($aux)?),
                },
            )*
        ];
    };
}

/// Encode the registries of a list of exporters into one buffer
///
/// # Example
/// ```ignore
/// gather_metrics!(buffer, encoder, state.exporters);
/// ```
#[macro_export]
macro_rules! gather_metrics {
    ($buffer:expr, $encoder:expr, $exporters:expr) => {
        for exporter in $exporters.iter() {
            let metric_families = exporter.registry().gather();
            if let Err(e) = $encoder.encode(&metric_families, &mut $buffer) {
                tracing::error!("Failed to encode {} metrics: {}", exporter.pmu().name(), e);
            }
        }
    };
}
