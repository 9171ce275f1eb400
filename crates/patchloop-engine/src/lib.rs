use anyhow::{Context as _, Result, anyhow};
use boa_engine::{Context, Source};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EvalOutput {
    /// Value returned by the script body, stringified. `None` for `undefined`.
    pub value: Option<String>,
    /// Lines written through the injected `console`, in emission order.
    pub console: Vec<String>,
    /// Message of the error the script raised, if any.
    pub thrown: Option<String>,
}

/// Script evaluation backend.
///
/// `Err` is reserved for failures of the engine itself. Errors raised by the
/// evaluated script (including syntax errors) are reported through
/// [`EvalOutput::thrown`].
pub trait JsEngine {
    fn eval_script(&mut self, source: &str, source_name: &str) -> Result<EvalOutput>;
}

#[derive(Debug, Deserialize)]
struct ScriptReport {
    console: Vec<String>,
    value: Option<String>,
    error: Option<String>,
}

pub struct BoaEngine {
    ctx: Context,
}

impl BoaEngine {
    pub fn new() -> Self {
        Self {
            ctx: Context::default(),
        }
    }
}

impl Default for BoaEngine {
    fn default() -> Self {
        Self::new()
    }
}

const PRELUDE: &str = r#"globalThis.__patchloop = (() => {
  const lines = [];
  const fmt = (args) => args.map((v) => String(v)).join(" ");
  const describe = (e) =>
    e !== null && e !== undefined && e.message !== undefined && e.message !== ""
      ? String(e.message)
      : String(e);
  let outcome = null;
  return {
    console: {
      log: (...args) => { lines.push(fmt(args)); },
      error: (...args) => { lines.push("Error: " + fmt(args)); },
      warn: (...args) => { lines.push("Warning: " + fmt(args)); },
      info: (...args) => { lines.push("Info: " + fmt(args)); },
    },
    fulfil: (v) => { outcome = { value: v === undefined ? null : String(v), error: null }; },
    reject: (e) => { outcome = { value: null, error: describe(e) }; },
    report: () => JSON.stringify({
      console: lines,
      value: outcome === null ? null : outcome.value,
      error: outcome === null ? "Script never settled: awaited a promise that was never resolved." : outcome.error,
    }),
  };
})();"#;

// The body starts on the wrapper's first line so parser line numbers match the
// source. It runs as an async function: `await` works at top level and a
// rejected promise counts as a failure. `console` is shadowed by the shim.
fn wrap_body(source: &str) -> String {
    format!(
        "(async (console) => {{ {source}\n}})(globalThis.__patchloop.console).then(globalThis.__patchloop.fulfil, globalThis.__patchloop.reject);"
    )
}

impl BoaEngine {
    fn eval_str(&mut self, code: &str) -> boa_engine::JsResult<boa_engine::JsValue> {
        self.ctx.eval(Source::from_bytes(code))
    }
}

impl JsEngine for BoaEngine {
    fn eval_script(&mut self, source: &str, source_name: &str) -> Result<EvalOutput> {
        // Fresh realm per evaluation: nothing leaks between attempts.
        self.ctx = Context::default();

        self.eval_str(PRELUDE)
            .map_err(|err| anyhow!("failed installing console for {source_name}: {err}"))?;

        if let Err(err) = self.eval_str(&wrap_body(source)) {
            debug!(source_name, error = %err, "script failed before running");
            return Ok(EvalOutput {
                value: None,
                console: Vec::new(),
                thrown: Some(err.to_string()),
            });
        }
        self.ctx.run_jobs();

        let rendered = self
            .eval_str("globalThis.__patchloop.report()")
            .and_then(|value| value.to_string(&mut self.ctx))
            .map_err(|err| anyhow!("failed reading report of {source_name}: {err}"))?
            .to_std_string_escaped();
        let report: ScriptReport = serde_json::from_str(&rendered)
            .with_context(|| format!("failed decoding evaluation report for {source_name}"))?;

        Ok(EvalOutput {
            value: report.value,
            console: report.console,
            thrown: report.error,
        })
    }
}
