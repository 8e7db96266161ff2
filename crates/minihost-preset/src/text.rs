//! Human-readable parameter dump

use crate::error::Result;
use minihost_plugin::PluginSession;
use std::io::Write;

/// Write one line per parameter of the current program.
///
/// ```text
/// TestSynth by minihost
/// ===
/// 0 Cutoff: 0.5 (50 %)
/// ```
///
/// Diagnostic only; there is no reader for this format.
pub fn write_text_dump<W: Write>(session: &PluginSession, mut sink: W) -> Result<()> {
    let text = text_dump(session)?;
    sink.write_all(text.as_bytes())?;
    sink.flush()?;
    Ok(())
}

/// The dump as a string.
pub fn text_dump(session: &PluginSession) -> Result<String> {
    session.exclusive(|s| -> Result<String> {
        let mut out = format!("{} by {}\n===\n", s.product_string(), s.vendor_name());
        for index in 0..s.num_parameters() {
            let p = s.parameter_info(index)?;
            out.push_str(&format!(
                "{} {}: {} ({} {})\n",
                p.index, p.name, p.value, p.display, p.label
            ));
        }
        Ok(out)
    })
}
