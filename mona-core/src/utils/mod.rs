pub mod poll_schedule;
