use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Safe to call on every request; only
/// the first call in an isolate/process takes effect.
pub fn init(filter: &str) {
  let filter = EnvFilter::try_new(filter)
    .unwrap_or_else(|_| EnvFilter::new(crate::consts::DEFAULT_LOG_LEVEL));

  #[cfg(not(target_arch = "wasm32"))]
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .try_init();

  // no clock or stdout inside a worker, so no timestamps and everything
  // goes to the console
  #[cfg(target_arch = "wasm32")]
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_ansi(false)
    .without_time()
    .with_writer(console::ConsoleWriter::default)
    .try_init();
}

#[cfg(target_arch = "wasm32")]
mod console {
  use std::io;

  /// Buffers one formatted event and hands it to `console.log` on drop.
  #[derive(Default)]
  pub struct ConsoleWriter(Vec<u8>);

  impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      self.0.extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  impl Drop for ConsoleWriter {
    fn drop(&mut self) {
      if !self.0.is_empty() {
        worker::console_log!("{}", String::from_utf8_lossy(&self.0).trim_end());
      }
    }
  }
}
