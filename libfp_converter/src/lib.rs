//! # fp_converter
//!
//! fp_converter converts multi-fiber photometry sessions into standardized HDF5 files,
//! written in Rust. It takes the raw imaging movie of the fiber bundle, the telemetry
//! recorded by the behavior rig (camera exposure TTLs, ball motion, licks, rewards and
//! stimuli), the ROI fluorescence traces extracted upstream and the histology fiber
//! locations, puts everything on one clock and writes a single file per session.
//!
//! ## Installation
//!
//! The only method of install is from source, which is laid out below.
//!
//! ### Rust
//!
//! If you have not used Rust before, you will most likely need to install the Rust tool
//! chain. See the [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions.
//!
//! ### HDF5
//!
//! Both the MATLAB v7.3 input files and the output files are HDF5, so HDF5 must be
//! installed before building. Typically this will be installed using a package manager
//! (homebrew, apt, etc), and the Rust libraries will auto detect the location of the HDF
//! install. If a custom install is needed, write the following snippet into the file
//! `.cargo/config.toml` in the fp_converter repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./fp_converter_cli` from the
//! top level fp_converter repository. To use the CLI see the `fp_converter_cli` README.
//!
//! ## How a session is converted
//!
//! 1. The rising edges of the TTL line that records the camera exposures are extracted
//!    ([`ttl`]).
//! 2. Each edge becomes the timestamp of one movie frame ([`timestamps`]). Extra trailing
//!    edges are ignored; missing edges truncate the movie.
//! 3. When two LEDs alternate on one camera, frames are split by position into one branch
//!    per excitation wavelength ([`demux`]).
//! 4. High-rate behavior channels are reduced to one value per frame of each branch
//!    ([`downsample`]), and velocity and event intervals are derived from them
//!    ([`behavior`]).
//! 5. Every branch is joined with its movie frames, fluorescence traces, fiber locations and
//!    instrument devices ([`session`]); any length disagreement rejects the session.
//! 6. The result is written to a temporary file and renamed on success ([`hdf_writer`],
//!    [`process`]).
//!
//! ## Configuration
//!
//! A configuration file is YAML:
//!
//! ```yml
//! manifest_path: /data/sessions.yml
//! data_path: /data
//! output_path: /data/nwb
//! instrument_path: null
//! overwrite: false
//! stub_test: false
//! timezone: US/Eastern
//! ball_diameter_m: null
//! telemetry_sample_rate: 2000.0
//! behavior_channels:
//! - name: ballYaw
//!   kind: continuous
//! - name: lick
//!   kind: binary
//! n_threads: 1
//! ```
//!
//! If `instrument_path` is `null` the bundled default instrument template is used. If
//! `ball_diameter_m` is `null` the rig ball diameter of 0.2032 m is used. With `stub_test`
//! only the first 6000 frames of every series are written. The session manifest format is
//! described in [`manifest`] and the fiber location table in [`fiber_locations`].
//!
//! ## Output
//!
//! One file named `{subject}-{date}.nwb` is written per session; the layout is documented in
//! [`hdf_writer`]. The CLI also writes a log file. If a session fails, the terminal will show
//! a red bar for that worker and the log file will contain the reason.
pub mod behavior;
pub mod config;
pub mod demux;
pub mod downsample;
pub mod error;
pub mod fiber_locations;
pub mod fluorescence;
pub mod hdf_writer;
pub mod instrument;
pub mod manifest;
pub mod mat_file;
pub mod movie;
pub mod process;
pub mod session;
pub mod telemetry;
pub mod timestamps;
pub mod ttl;
pub mod worker_status;
