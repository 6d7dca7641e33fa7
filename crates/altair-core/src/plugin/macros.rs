/// Export the plugin contract from a Rust `cdylib`.
///
/// Hooks are ordinary safe functions; the macro generates the `extern "C"`
/// exports the loader resolves. `capabilities` initialises a static, so
/// combine flags with the const [`Capabilities::union`](crate::plugin::Capabilities::union)
/// rather than `|`.
///
/// ```ignore
/// use std::time::Duration;
///
/// use altair_core::plugin::{Capabilities, PluginHost, PluginTask};
///
/// fn init(host: &PluginHost) -> bool {
///     println!("loaded from {:?}", host.path());
///     true
/// }
///
/// fn run(task: &PluginTask) -> u32 {
///     while !task.wait_for_exit(Duration::from_millis(100)) {}
///     0
/// }
///
/// altair_core::declare_plugin! {
///     capabilities: Capabilities::ASYNC,
///     init: init,
///     proc: run,
/// }
/// ```
#[macro_export]
macro_rules! declare_plugin {
    (
        capabilities: $caps:expr
        $(, init: $init:path)?
        $(, update: $update:path)?
        $(, proc: $proc_fn:path)?
        $(, cleanup: $cleanup:path)?
        $(,)?
    ) => {
        #[doc(hidden)]
        #[unsafe(export_name = "type")]
        pub static ALTAIR_PLUGIN_TYPE: u32 = $crate::plugin::Capabilities::bits($caps);

        $(
            #[doc(hidden)]
            #[unsafe(export_name = "init")]
            pub unsafe extern "C" fn __altair_plugin_init(host: *const $crate::plugin::PluginHost) -> bool {
                // SAFETY: the host passes a pointer valid for the duration of the call.
                let Some(host) = (unsafe { host.as_ref() }) else {
                    return false;
                };
                let hook: fn(&$crate::plugin::PluginHost) -> bool = $init;
                hook(host)
            }
        )?

        $(
            #[doc(hidden)]
            #[unsafe(export_name = "update")]
            pub unsafe extern "C" fn __altair_plugin_update(frame: u64) -> u32 {
                let hook: fn(u64) -> u32 = $update;
                hook(frame)
            }
        )?

        $(
            #[doc(hidden)]
            #[unsafe(export_name = "proc")]
            pub unsafe extern "C" fn __altair_plugin_proc(task: *const $crate::plugin::PluginTask) -> u32 {
                // SAFETY: the worker passes a task that outlives the call.
                let Some(task) = (unsafe { task.as_ref() }) else {
                    return u32::MAX;
                };
                let hook: fn(&$crate::plugin::PluginTask) -> u32 = $proc_fn;
                hook(task)
            }
        )?

        $(
            #[doc(hidden)]
            #[unsafe(export_name = "cleanup")]
            pub unsafe extern "C" fn __altair_plugin_cleanup() -> bool {
                let hook: fn() -> bool = $cleanup;
                hook()
            }
        )?
    };
}
