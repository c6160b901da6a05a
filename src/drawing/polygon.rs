use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::geometry::{Coordinates, GeometryError, LinearRing, Polygon};

/// Screen distance (density-independent pixels) within which the live vertex
/// snaps onto the first vertex. Inclusive.
pub const DISTANCE_THRESHOLD_DP: f64 = 24.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrawingError {
    #[error("invalid drawing state: {0}")]
    State(&'static str),
    #[error("closed outline is not a valid ring: {0}")]
    Geometry(#[from] GeometryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawingPhase {
    Empty,
    Drawing,
    /// Live vertex snapped onto the first vertex; awaiting confirmation.
    Closable,
    Complete,
}

/// Published state of the outline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftPolygon {
    pub vertices: Vec<Coordinates>,
    pub is_complete: bool,
}

impl DraftPolygon {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Renderable shape for the map layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: String,
    pub polygon: DraftPolygon,
}

/// Vertex-by-vertex polygon drawing.
///
/// The last vertex is always the live one following the cursor;
/// [`PolygonDrawing::add_last_vertex`] fixes it and opens a new live vertex.
pub struct PolygonDrawing {
    feature_id: String,
    vertices: Vec<Coordinates>,
    closed: bool,
    confirmed: bool,
    tx: watch::Sender<DraftPolygon>,
}

impl Default for PolygonDrawing {
    fn default() -> Self {
        Self::new()
    }
}

impl PolygonDrawing {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(DraftPolygon::default());
        Self {
            feature_id: Uuid::new_v4().to_string(),
            vertices: Vec::new(),
            closed: false,
            confirmed: false,
            tx,
        }
    }

    /// Receives a snapshot after every applied operation.
    pub fn subscribe(&self) -> watch::Receiver<DraftPolygon> {
        self.tx.subscribe()
    }

    pub fn phase(&self) -> DrawingPhase {
        match (self.vertices.is_empty(), self.closed, self.confirmed) {
            (true, _, _) => DrawingPhase::Empty,
            (false, _, true) => DrawingPhase::Complete,
            (false, true, false) => DrawingPhase::Closable,
            (false, false, false) => DrawingPhase::Drawing,
        }
    }

    pub fn vertices(&self) -> &[Coordinates] {
        &self.vertices
    }

    pub fn is_complete(&self) -> bool {
        self.closed
    }

    pub fn snapshot(&self) -> DraftPolygon {
        DraftPolygon {
            vertices: self.vertices.clone(),
            is_complete: self.closed,
        }
    }

    /// Empty without vertices, otherwise the single draft outline.
    pub fn features(&self) -> Vec<Feature> {
        if self.vertices.is_empty() {
            return Vec::new();
        }
        vec![Feature {
            id: self.feature_id.clone(),
            polygon: self.snapshot(),
        }]
    }

    /// Moves the live vertex to `point`, or places the first vertex.
    ///
    /// With at least three fixed vertices and `distance(point, first)` within
    /// [`DISTANCE_THRESHOLD_DP`], the live vertex lands exactly on the first
    /// vertex and the outline closes.
    pub fn update_last_vertex_and_maybe_complete_polygon<F>(
        &mut self,
        point: Coordinates,
        distance: F,
    ) -> Result<(), DrawingError>
    where
        F: FnOnce(Coordinates, Coordinates) -> f64,
    {
        if self.confirmed {
            return Err(DrawingError::State("polygon already completed"));
        }

        self.vertices.pop();
        let near_first = self
            .vertices
            .first()
            .is_some_and(|first| distance(point, *first) <= DISTANCE_THRESHOLD_DP);

        if near_first && self.vertices.len() >= 3 {
            let first = self.vertices[0];
            self.vertices.push(first);
            self.closed = true;
        } else {
            self.vertices.push(point);
            self.closed = false;
        }
        self.publish();
        Ok(())
    }

    /// Fixes the live vertex and starts a new one at the same position.
    pub fn add_last_vertex(&mut self) -> Result<(), DrawingError> {
        if self.closed || self.confirmed {
            return Err(DrawingError::State("polygon is closed"));
        }
        let Some(last) = self.vertices.last().copied() else {
            return Ok(());
        };
        self.vertices.push(last);
        self.publish();
        Ok(())
    }

    /// Drops the last vertex. Removing the closing vertex re-opens drawing.
    pub fn remove_last_vertex(&mut self) {
        if self.vertices.pop().is_none() {
            return;
        }
        if self.closed {
            debug!("closing vertex removed, outline re-opened");
        }
        self.closed = false;
        self.confirmed = false;
        self.publish();
    }

    /// Confirms a closed outline and returns it.
    pub fn on_complete_polygon_button_click(&mut self) -> Result<Polygon, DrawingError> {
        if !self.closed || self.confirmed {
            return Err(DrawingError::State("polygon is not complete"));
        }
        let shell = LinearRing::new(self.vertices.clone())?;
        self.confirmed = true;
        self.publish();
        Ok(Polygon::new(shell))
    }

    fn publish(&self) {
        self.tx.send_replace(self.snapshot());
    }
}
