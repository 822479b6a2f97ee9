//! `calsched export`: emits an ICS document of unmanaged scheduler rows
//! (§1.4), reusing the `icalendar` crate the way
//! `caldir-core/src/ics/generate.rs` builds one `VEVENT` per event.

use anyhow::Result;
use icalendar::{Calendar, Component, EventLike};

use super::assemble;

fn format_dt(date: chrono::NaiveDate, time: chrono::NaiveTime) -> String {
    date.and_time(time).format("%Y%m%dT%H%M%S").to_string()
}

pub async fn run() -> Result<()> {
    let ctx = assemble().await?;

    let mut cal = Calendar::new();
    for event in ctx.fpp_manifest.events.values() {
        if event.ownership.managed {
            continue;
        }
        for (i, sub) in event.sub_events.iter().enumerate() {
            let (Some(start_date), Some(start_time)) =
                (sub.timing.start_date.as_hard(), sub.timing.start_time.as_hard())
            else {
                continue;
            };
            let (Some(end_date), Some(end_time)) = (sub.timing.end_date.as_hard(), sub.timing.end_time.as_hard())
            else {
                continue;
            };

            let uid = format!("{}-{i}@calsched", event.identity_hash);
            let mut ics_event = icalendar::Event::new();
            ics_event.uid(&uid);
            ics_event.summary(&event.identity.target);
            ics_event.add_property("DTSTART", format_dt(start_date, start_time));
            ics_event.add_property("DTEND", format_dt(end_date, end_time));
            if !sub.behavior.enabled {
                ics_event.add_property("STATUS", "CANCELLED");
            }
            cal.push(ics_event.done());
        }
    }

    print!("{}", cal.done());
    Ok(())
}
