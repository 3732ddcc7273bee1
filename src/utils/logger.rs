/// Initializes the logging system from the default file `log4rs.yaml` in the
/// working directory. Prefer [`init_for_db_in`] for programmatic control.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let _ = log4rs::init_file("log4rs.yaml", log4rs::config::Deserializers::default());
    Ok(())
}

/// Initializes logging to a database-scoped folder:
/// `{base}/{db_name}_logs/{db_name}.log`, with size-based rolling.
///
/// # Errors
/// Returns an error if the directory cannot be created or the logger fails to
/// initialize.
pub fn init_for_db_in(
    base_dir: &std::path::Path,
    db_name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    use log::LevelFilter;
    use log4rs::append::rolling_file::RollingFileAppender;
    use log4rs::append::rolling_file::policy::compound::{
        CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
    };
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;
    use std::fs;
    use std::path::PathBuf;

    let mut dir = PathBuf::from(base_dir);
    dir.push(format!("{db_name}_logs"));
    fs::create_dir_all(&dir)?;
    let app_log = dir.join(format!("{db_name}.log"));
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join(format!("{db_name}.{{}}.log")).display()), 7)?;
    let policy =
        CompoundPolicy::new(Box::new(SizeTrigger::new(10 * 1024 * 1024)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}")))
        .build(app_log, Box::new(policy))?;
    let config = Config::builder()
        .appender(Appender::builder().build("app", Box::new(appender)))
        .build(Root::builder().appender("app").build(LevelFilter::Info))?;
    // A second initialization in the same process keeps the first config.
    let _ = log4rs::init_config(config);
    Ok(())
}
