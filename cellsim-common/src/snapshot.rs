use serde::{Serialize, Deserialize};

/// Live cells per cell-cycle phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts {
    pub g1: u32,
    pub s: u32,
    pub g2: u32,
    pub m: u32,
    pub divided: u32,
    pub apoptosis: u32,
}

/// Summary statistics of one molecule field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub name: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Flat record of one cell, for export collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: u64,
    pub phase: String,
    pub cell_type: String,
    pub row: i32,
    pub col: i32,
    pub size: f64,
    pub genome_integrity: f64,
    pub age: f64,
}

/// A snapshot of the simulation state and metrics at a specific time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The simulation time (in hours) at which the snapshot was taken.
    pub time: f64,
    /// Number of ticks applied so far.
    pub step: u64,
    /// The number of live cells.
    pub cell_count: u32,
    pub phase_counts: PhaseCounts,
    /// Mean genome integrity over live cells (0.0 when the population is empty).
    pub mean_genome_integrity: f64,
    /// One entry per tracked molecule, in environment order.
    pub fields: Vec<FieldSummary>,
    pub mean_temperature: f64,
    pub mean_ph: f64,
    /// Included only if `config.output.save_cells_in_snapshot` is true.
    #[serde(skip_serializing_if = "Option::is_none")] // Don't write "cells": null
    pub cells: Option<Vec<CellRecord>>,
}
