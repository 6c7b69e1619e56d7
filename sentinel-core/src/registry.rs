use crate::model::{Capability, Coordinate, IncidentLocation, Responder};

/// Lookup seam for responders and named locations. The static tables below
/// stand in for a live duty roster and geo index.
pub trait ResponderDirectory: Send + Sync {
    fn responders(&self) -> &[Responder];
    fn locations(&self) -> &[IncidentLocation];

    fn responder(&self, id: &str) -> Option<&Responder> {
        self.responders().iter().find(|r| r.id == id)
    }

    fn location(&self, name: &str) -> Option<Coordinate> {
        self.locations()
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.position)
    }
}

#[derive(Clone, Debug)]
pub struct StaticDirectory {
    responders: Vec<Responder>,
    locations: Vec<IncidentLocation>,
}

impl StaticDirectory {
    pub fn new(responders: Vec<Responder>, locations: Vec<IncidentLocation>) -> Self {
        Self {
            responders,
            locations,
        }
    }

    pub fn seeded() -> Self {
        Self::new(seed_responders(), seed_locations())
    }
}

impl Default for StaticDirectory {
    fn default() -> Self {
        Self::seeded()
    }
}

impl ResponderDirectory for StaticDirectory {
    fn responders(&self) -> &[Responder] {
        &self.responders
    }

    fn locations(&self) -> &[IncidentLocation] {
        &self.locations
    }
}

fn responder(id: &str, capability: Capability, lat: f64, lng: f64, on_duty: bool) -> Responder {
    Responder {
        id: id.into(),
        capability,
        position: Coordinate::new(lat, lng),
        on_duty,
    }
}

fn location(name: &str, lat: f64, lng: f64) -> IncidentLocation {
    IncidentLocation {
        name: name.into(),
        position: Coordinate::new(lat, lng),
    }
}

pub fn seed_responders() -> Vec<Responder> {
    vec![
        responder("medic-01", Capability::Medical, 25.447, 81.875, true),
        responder("medic-02", Capability::Medical, 25.442, 81.845, true),
        responder("security-01", Capability::Security, 25.452, 81.868, true),
        responder("security-02", Capability::Security, 25.441, 81.851, false),
    ]
}

pub fn seed_locations() -> Vec<IncidentLocation> {
    vec![
        location("Ghat 5", 25.4485, 81.872),
        location("Sector 12 Bridge", 25.444, 81.849),
        location("Main Parking", 25.451, 81.865),
        location("Ghat 2", 25.447, 81.868),
        location("Market Area", 25.450, 81.855),
        location("Service Road 3", 25.443, 81.860),
    ]
}
