use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bronze_core::{Config, GYM_LOGINS, KAFKA_MULTIPLEX, REGISTERED_USERS};
use bronze_ingest::Bronze;
use bronze_table::{BronzeTable, RowFilter};

/// 2020-09-13T12:26:40Z, a Sunday.
pub const SUNDAY_MS: i64 = 1_600_000_000_000;
/// 2020-09-14T12:26:40Z, a Monday.
pub const MONDAY_MS: i64 = SUNDAY_MS + 86_400_000;

/// Config rooted in a scratch directory, with a date lookup already in place.
pub fn test_config(root: &Path) -> Config {
    let config = Config::rooted_at(root);
    write_date_lookup(&config);
    config
}

pub fn bronze(config: &Config) -> Bronze {
    Bronze::new(config.clone()).unwrap()
}

pub fn write_date_lookup(config: &Config) {
    let path = &config.paths.date_lookup_path;
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        path,
        "date,week,year,month,dayofweek,dayofmonth,dayofyear,week_part\n\
         2020-09-13,37,2020,9,1,13,257,weekend\n\
         2020-09-14,38,2020,9,2,14,258,weekday\n",
    )
    .unwrap();
}

pub fn landing_dir(config: &Config, source: &str) -> PathBuf {
    let dir = config.paths.landing_zone().join(source);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Replace a source's checkpoint with unparseable JSON.
pub fn corrupt_checkpoint(config: &Config, source: &str) {
    let dir = config.paths.checkpoint_base().join(source);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("checkpoint.json"), "{corrupt").unwrap();
}

/// Write a unit under a hidden name, then rename it into place so a
/// running pipeline never sees it half written.
pub fn land_file(config: &Config, source: &str, name: &str, body: &str) -> PathBuf {
    let dir = landing_dir(config, source);
    let staged = dir.join(format!(".{name}"));
    let path = dir.join(name);
    fs::write(&staged, body).unwrap();
    fs::rename(&staged, &path).unwrap();
    path
}

/// Five user registrations for data set `set`.
pub fn land_registered_users(config: &Config, set: u32) {
    let mut body = String::from("user_id,device_id,mac_address,registration_timestamp\n");
    for i in 0..5u32 {
        let user = set * 100 + i;
        body.push_str(&format!("{user},{},14:4f:8a:{user:02x},{}.5\n", 1000 + user, 1_600_000_000 + user));
    }
    land_file(config, REGISTERED_USERS, &format!("registered_users_{set}.csv"), &body);
}

/// Eight gym logins for data set `set`, split over two files.
pub fn land_gym_logins(config: &Config, set: u32) {
    for part in 0..2u32 {
        let mut body = String::from("mac_address,gym,login,logout\n");
        for i in 0..4u32 {
            let login = 1_600_000_000 + set * 10_000 + part * 100 + i;
            body.push_str(&format!("14:4f:8a:{:02x},{},{login},{}\n", part * 4 + i, 5 + part, login + 3600));
        }
        land_file(config, GYM_LOGINS, &format!("gym_logins_{set}_{part}.csv"), &body);
    }
}

fn event_line(topic: &str, offset: u64, timestamp_ms: i64) -> String {
    format!(
        r#"{{"key":"{offset}","value":"{{\"device_id\":{offset}}}","topic":"{topic}","partition":0,"offset":{offset},"timestamp":{timestamp_ms}}}"#
    )
}

/// One multiplexed data set: `user_info` (7 for the first set, 6 after),
/// 16 `workout` and `bpm_events` heart-rate events spread over three files.
pub fn land_kafka_multiplex(config: &Config, set: u32, bpm_events: u64) {
    let dir = landing_dir(config, KAFKA_MULTIPLEX);
    let user_info = if set == 1 { 7 } else { 6 };

    let mut body = String::new();
    for i in 0..user_info {
        body.push_str(&event_line("user_info", i, SUNDAY_MS));
        body.push('\n');
    }
    for i in 0..16 {
        body.push_str(&event_line("workout", 100 + i, MONDAY_MS));
        body.push('\n');
    }
    fs::write(dir.join(format!("kafka_{set}_0.json")), body).unwrap();

    let per_file = bpm_events.div_ceil(3);
    let mut written = 0;
    for part in 1..=3 {
        let file = fs::File::create(dir.join(format!("kafka_{set}_{part}.json"))).unwrap();
        let mut out = BufWriter::new(file);
        let end = (written + per_file).min(bpm_events);
        for offset in written..end {
            writeln!(out, "{}", event_line("bpm", 1000 + offset, SUNDAY_MS + offset as i64)).unwrap();
        }
        out.flush().unwrap();
        written = end;
    }
}

pub fn land_data_set(config: &Config, set: u32, bpm_events: u64) {
    land_registered_users(config, set);
    land_gym_logins(config, set);
    land_kafka_multiplex(config, set, bpm_events);
}

pub fn read_table(config: &Config, table: &str) -> BronzeTable {
    bronze_table::Warehouse::from_config(config)
        .read_table(table)
        .unwrap()
}

pub fn count(config: &Config, table: &str, filter: &str) -> u64 {
    read_table(config, table)
        .count(&RowFilter::parse(filter).unwrap())
        .unwrap()
}
