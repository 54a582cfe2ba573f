//! Host-side tooling for an ESP32 board that streams a microphone voltage
//! and the three axes of an ADXL354 accelerometer over a serial line.
//!
//! Bytes arrive in arbitrary pieces. A [`line_framer::LineFramer`] turns
//! them into lines, a [`record_parser::RecordParser`] turns lines into
//! records, and a [`frame_assembler::FrameAssembler`] turns records into
//! complete [`sample::Sample`]s. Each sample lands in the display buffers
//! ([`scope_buffers::RingBufferSet`]) and in the unbounded
//! [`export_log::ExportLog`], which can be written out as CSV.
//! [`session::Session`] ties those stages together and
//! [`connection::Connection`] feeds it from a [`transport::Transport`].

#![warn(missing_docs)]
pub mod args;
pub mod config;
pub mod connection;
pub mod export_log;
pub mod frame_assembler;
pub mod gui;
pub mod line_framer;
pub mod record_parser;
pub mod ring_buffer;
pub mod sample;
pub mod scope_buffers;
pub mod session;
pub mod transport;
