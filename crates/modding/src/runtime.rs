#[cfg(feature = "mod_lua")]
mod runtime_lua;
#[cfg(feature = "mod_lua")]
pub use runtime_lua::{LuaBridge, LuaRuleSet};

#[cfg(feature = "mod_wasm")]
mod runtime_wasm;
#[cfg(feature = "mod_wasm")]
pub use runtime_wasm::{WasmBridge, WasmRuleSet};

/// Backends compiled into this build, by name.
pub fn compiled_backends() -> Vec<&'static str> {
    let mut backends = Vec::new();
    #[cfg(feature = "mod_lua")]
    backends.push("lua");
    #[cfg(feature = "mod_wasm")]
    backends.push("wasm");
    backends
}
