use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub type LogFile = Arc<Mutex<BufWriter<File>>>;

/// Opens `<dir>/<tool>_<YYYYmmdd_HHMMSS>.log`
pub fn open_log_file(dir: &str, tool: &str) -> Result<LogFile> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create log dir {}", dir))?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = Path::new(dir).join(format!("{}_{}.log", tool, ts));
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    eprintln!("Log: {}", path.display());
    Ok(Arc::new(Mutex::new(BufWriter::new(file))))
}

/// Writes one line to stderr and, when given, to the log file
#[macro_export]
macro_rules! log {
    ($logfile:expr, $($arg:tt)*) => {{
        use std::io::Write as _;
        let msg = format!($($arg)*);
        eprintln!("{}", msg);
        if let Some(logfile) = $logfile {
            if let Ok(mut f) = logfile.lock() {
                let _ = writeln!(f, "{}", msg);
                let _ = f.flush();
            }
        }
    }};
}
