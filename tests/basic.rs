use log::{Level, LevelFilter};
use safe_log::harness::ControlledSink;
use safe_log::{GlobalInitLock, LogRecord, SafeLogHandler};
use std::sync::Arc;
use std::thread;

#[test]
fn basic_usage() {
    let handler = SafeLogHandler::builder(ControlledSink::new()).build();

    let result = handler.handle(&LogRecord::new(Level::Info, "hello"));
    assert!(result.is_ok());
    assert!(result.unwrap());
}

#[test]
fn installed_as_logger() {
    let sink = Arc::new(ControlledSink::new());
    let handler = SafeLogHandler::builder(Arc::clone(&sink)).build();
    handler.install(LevelFilter::Info).unwrap();

    let mut children = vec![];
    for i in 0..8 {
        children.push(thread::spawn(move || {
            // Half the threads log from inside an initialization section.
            if i % 2 == 0 {
                GlobalInitLock::global().initialize(|| log::info!("init worker {}", i));
            } else {
                log::info!("worker {}", i);
            }
            log::debug!("filtered out");
        }));
    }

    for child in children {
        let _ = child.join();
    }
    log::logger().flush();

    let emitted = sink.emitted();
    assert!(!emitted.is_empty());
    assert!(emitted.len() <= 8);
    assert!(emitted.iter().all(|message| message.contains("worker")));
}
