use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, Weekday};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::GtfsError;
use crate::route::{RoutePath, StopRecord};

// GTFS data structures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub route_id: String,
    #[serde(default)]
    pub agency_id: String,
    pub route_short_name: String,
    pub route_long_name: String,
    pub route_type: u32,
    #[serde(default)]
    pub route_color: String,
    #[serde(default)]
    pub route_text_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
    #[serde(default)]
    pub shape_id: Option<String>,
    #[serde(default)]
    pub trip_headsign: Option<String>,
    #[serde(default)]
    pub direction_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopTime {
    pub trip_id: String,
    pub arrival_time: String,
    pub departure_time: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    #[serde(default)]
    pub stop_headsign: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: String,
    pub stop_name: String,
    #[serde(default)]
    pub stop_desc: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapePoint {
    pub shape_id: String,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
    pub shape_pt_sequence: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Calendar {
    pub service_id: String,
    pub monday: u8,
    pub tuesday: u8,
    pub wednesday: u8,
    pub thursday: u8,
    pub friday: u8,
    pub saturday: u8,
    pub sunday: u8,
    pub start_date: String,
    pub end_date: String,
}

impl Calendar {
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        let flag = match date.weekday() {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        };
        if flag != 1 {
            return false;
        }
        match (parse_date(&self.start_date), parse_date(&self.end_date)) {
            (Some(start), Some(end)) => start <= date && date <= end,
            _ => false,
        }
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d").ok()
}

/// Seconds past service-day midnight. Hours may run past 24.
pub fn parse_gtfs_time(raw: &str) -> Result<u32, GtfsError> {
    let invalid = || GtfsError::InvalidTime(raw.to_string());
    let mut parts = raw.trim().split(':');
    let mut next = || -> Result<u32, GtfsError> {
        parts.next().ok_or_else(invalid)?.parse::<u32>().map_err(|_| invalid())
    };
    let (h, m, s) = (next()?, next()?, next()?);
    if m >= 60 || s >= 60 || parts.next().is_some() {
        return Err(invalid());
    }
    h.checked_mul(3600)
        .and_then(|t| t.checked_add(m * 60 + s))
        .ok_or_else(invalid)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSummary {
    pub route_id: String,
    pub route_short_name: String,
    pub route_long_name: String,
    pub route_type: u32,
    pub route_color: String,
    pub route_text_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStopsResponse {
    pub route_id: String,
    pub route_short_name: String,
    pub route_long_name: String,
    pub direction: u32,
    pub stops: Vec<StopRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Departure {
    pub trip_id: String,
    pub route_id: String,
    pub route_short_name: String,
    pub headsign: Option<String>,
    pub departure_time: String,
    pub stop_sequence: u32,
}

/// The static feed, loaded once and indexed for the dashboard's queries.
#[derive(Debug, Default)]
pub struct GtfsFeed {
    routes: Vec<Route>,
    trips_by_route: HashMap<String, Vec<Trip>>,
    trips: HashMap<String, Trip>,
    stop_times_by_trip: HashMap<String, Vec<StopTime>>,
    stop_times_by_stop: HashMap<String, Vec<(String, usize)>>,
    stops: HashMap<String, Stop>,
    shapes: HashMap<String, Vec<ShapePoint>>,
    calendar: HashMap<String, Calendar>,
}

fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, GtfsError> {
    let file = File::open(path).map_err(|source| GtfsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: T = result.map_err(|source| GtfsError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(row);
    }
    Ok(rows)
}

// shapes.txt and calendar.txt are optional in GTFS
fn read_optional_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, GtfsError> {
    if path.exists() {
        read_table(path)
    } else {
        Ok(Vec::new())
    }
}

impl GtfsFeed {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, GtfsError> {
        let dir: PathBuf = dir.as_ref().to_path_buf();
        let routes: Vec<Route> = read_table(&dir.join("routes.txt"))?;
        let trips: Vec<Trip> = read_table(&dir.join("trips.txt"))?;
        let stop_times: Vec<StopTime> = read_table(&dir.join("stop_times.txt"))?;
        let stops: Vec<Stop> = read_table(&dir.join("stops.txt"))?;
        let shapes: Vec<ShapePoint> = read_optional_table(&dir.join("shapes.txt"))?;
        let calendar: Vec<Calendar> = read_optional_table(&dir.join("calendar.txt"))?;

        let feed = Self::from_tables(routes, trips, stop_times, stops, shapes, calendar);
        info!(
            path = %dir.display(),
            routes = feed.routes.len(),
            trips = feed.trips.len(),
            stops = feed.stops.len(),
            shapes = feed.shapes.len(),
            "Loaded GTFS feed"
        );
        Ok(feed)
    }

    pub fn from_tables(
        routes: Vec<Route>,
        trips: Vec<Trip>,
        stop_times: Vec<StopTime>,
        stops: Vec<Stop>,
        shapes: Vec<ShapePoint>,
        calendar: Vec<Calendar>,
    ) -> Self {
        let mut trips_by_route: HashMap<String, Vec<Trip>> = HashMap::new();
        let mut trips_by_id = HashMap::new();
        for trip in trips {
            trips_by_route.entry(trip.route_id.clone()).or_default().push(trip.clone());
            trips_by_id.insert(trip.trip_id.clone(), trip);
        }

        let mut stop_times_by_trip: HashMap<String, Vec<StopTime>> = HashMap::new();
        for stop_time in stop_times {
            stop_times_by_trip.entry(stop_time.trip_id.clone()).or_default().push(stop_time);
        }
        let mut stop_times_by_stop: HashMap<String, Vec<(String, usize)>> = HashMap::new();
        for (trip_id, times) in stop_times_by_trip.iter_mut() {
            times.sort_by_key(|st| st.stop_sequence);
            for (i, st) in times.iter().enumerate() {
                stop_times_by_stop.entry(st.stop_id.clone()).or_default().push((trip_id.clone(), i));
            }
        }

        let mut shapes_by_id: HashMap<String, Vec<ShapePoint>> = HashMap::new();
        for point in shapes {
            shapes_by_id.entry(point.shape_id.clone()).or_default().push(point);
        }
        for points in shapes_by_id.values_mut() {
            points.sort_by_key(|p| p.shape_pt_sequence);
        }

        Self {
            routes,
            trips_by_route,
            trips: trips_by_id,
            stop_times_by_trip,
            stop_times_by_stop,
            stops: stops.into_iter().map(|s| (s.stop_id.clone(), s)).collect(),
            shapes: shapes_by_id,
            calendar: calendar.into_iter().map(|c| (c.service_id.clone(), c)).collect(),
        }
    }

    pub fn routes(&self) -> Vec<RouteSummary> {
        let mut routes: Vec<RouteSummary> = self
            .routes
            .iter()
            .map(|r| RouteSummary {
                route_id: r.route_id.clone(),
                route_short_name: r.route_short_name.clone(),
                route_long_name: r.route_long_name.clone(),
                route_type: r.route_type,
                route_color: r.route_color.clone(),
                route_text_color: r.route_text_color.clone(),
            })
            .collect();
        routes.sort_by(|a, b| a.route_short_name.cmp(&b.route_short_name));
        routes
    }

    fn route(&self, route_id: &str) -> Result<&Route, GtfsError> {
        self.routes
            .iter()
            .find(|r| r.route_id == route_id)
            .ok_or_else(|| GtfsError::RouteNotFound(route_id.to_string()))
    }

    // The first trip in the given direction stands in for the whole route.
    fn representative_trip(&self, route_id: &str, direction: u32) -> Result<&Trip, GtfsError> {
        self.route(route_id)?;
        self.trips_by_route
            .get(route_id)
            .and_then(|trips| trips.iter().find(|t| t.direction_id.unwrap_or(0) == direction))
            .ok_or_else(|| GtfsError::NoTripForDirection {
                route_id: route_id.to_string(),
                direction,
            })
    }

    pub fn route_stops(&self, route_id: &str, direction: u32) -> Result<RouteStopsResponse, GtfsError> {
        let route = self.route(route_id)?;
        let trip = self.representative_trip(route_id, direction)?;
        let stop_times = self
            .stop_times_by_trip
            .get(&trip.trip_id)
            .ok_or_else(|| GtfsError::NoStopTimes(trip.trip_id.clone()))?;

        // Already sorted by stop_sequence
        let stops = stop_times
            .iter()
            .filter_map(|st| {
                self.stops.get(&st.stop_id).map(|stop| StopRecord {
                    id: stop.stop_id.clone(),
                    name: stop.stop_name.clone(),
                    lat: stop.stop_lat,
                    lng: stop.stop_lon,
                    sequence: st.stop_sequence,
                })
            })
            .collect();

        Ok(RouteStopsResponse {
            route_id: route.route_id.clone(),
            route_short_name: route.route_short_name.clone(),
            route_long_name: route.route_long_name.clone(),
            direction,
            stops,
        })
    }

    pub fn route_path(&self, route_id: &str, direction: u32) -> Result<RoutePath, GtfsError> {
        let trip = self.representative_trip(route_id, direction)?;
        let coordinates = trip
            .shape_id
            .as_ref()
            .and_then(|id| self.shapes.get(id))
            .map(|points| points.iter().map(|p| [p.shape_pt_lat, p.shape_pt_lon]).collect())
            .unwrap_or_default();
        let stops = self.route_stops(route_id, direction)?.stops;
        Ok(RoutePath {
            route_id: route_id.to_string(),
            direction,
            coordinates,
            stops,
        })
    }

    pub fn search_stops(&self, query: &str, limit: usize) -> Vec<StopRecord> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut matches: Vec<&Stop> = self
            .stops
            .values()
            .filter(|s| s.stop_name.to_lowercase().contains(&needle) || s.stop_id.to_lowercase().contains(&needle))
            .collect();
        matches.sort_by(|a, b| a.stop_name.cmp(&b.stop_name).then_with(|| a.stop_id.cmp(&b.stop_id)));
        matches
            .into_iter()
            .take(limit)
            .map(|s| StopRecord {
                id: s.stop_id.clone(),
                name: s.stop_name.clone(),
                lat: s.stop_lat,
                lng: s.stop_lon,
                sequence: 0,
            })
            .collect()
    }

    fn service_runs_on(&self, service_id: &str, date: NaiveDate) -> bool {
        self.calendar.get(service_id).map_or(true, |c| c.runs_on(date))
    }

    pub fn departures(
        &self,
        stop_id: &str,
        date: NaiveDate,
        after_s: u32,
        limit: usize,
    ) -> Result<Vec<Departure>, GtfsError> {
        if !self.stops.contains_key(stop_id) {
            return Err(GtfsError::StopNotFound(stop_id.to_string()));
        }

        let mut found: Vec<(u32, Departure)> = Vec::new();
        for (trip_id, i) in self.stop_times_by_stop.get(stop_id).into_iter().flatten() {
            let Some(trip) = self.trips.get(trip_id) else {
                continue;
            };
            if !self.service_runs_on(&trip.service_id, date) {
                continue;
            }
            let Some(st) = self.stop_times_by_trip.get(trip_id).and_then(|times| times.get(*i)) else {
                continue;
            };
            let departs = match parse_gtfs_time(&st.departure_time) {
                Ok(t) => t,
                Err(e) => {
                    warn!(%trip_id, stop_id, "Skipping stop time: {}", e);
                    continue;
                }
            };
            if departs < after_s {
                continue;
            }
            let route_short_name = self
                .route(&trip.route_id)
                .map(|r| r.route_short_name.clone())
                .unwrap_or_default();
            found.push((
                departs,
                Departure {
                    trip_id: trip.trip_id.clone(),
                    route_id: trip.route_id.clone(),
                    route_short_name,
                    headsign: st.stop_headsign.clone().or_else(|| trip.trip_headsign.clone()),
                    departure_time: st.departure_time.clone(),
                    stop_sequence: st.stop_sequence,
                },
            ));
        }

        found.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.trip_id.cmp(&b.1.trip_id)));
        Ok(found.into_iter().take(limit).map(|(_, d)| d).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> GtfsFeed {
        GtfsFeed::load(Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/izmir")).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn gtfs_times_past_midnight() {
        assert_eq!(parse_gtfs_time("00:00:00").unwrap(), 0);
        assert_eq!(parse_gtfs_time("07:05:30").unwrap(), 7 * 3600 + 5 * 60 + 30);
        assert_eq!(parse_gtfs_time(" 25:10:00").unwrap(), 25 * 3600 + 600);
        assert!(parse_gtfs_time("7:5").is_err());
        assert!(parse_gtfs_time("07:61:00").is_err());
        assert!(parse_gtfs_time("aa:00:00").is_err());
        assert!(parse_gtfs_time("4000000:00:00").is_err());
        assert_eq!(parse_gtfs_time("1193046:28:15").unwrap(), u32::MAX);
        assert!(parse_gtfs_time("1193046:28:16").is_err());
    }

    #[test]
    fn calendar_weekday_and_range() {
        let weekdays = Calendar {
            service_id: "WK".into(),
            monday: 1,
            tuesday: 1,
            wednesday: 1,
            thursday: 1,
            friday: 1,
            saturday: 0,
            sunday: 0,
            start_date: "20260101".into(),
            end_date: "20261231".into(),
        };
        // 2026-10-19 is a Monday
        assert!(weekdays.runs_on(date(2026, 10, 19)));
        assert!(!weekdays.runs_on(date(2026, 10, 18)));
        assert!(!weekdays.runs_on(date(2027, 1, 4)));
    }

    #[test]
    fn routes_sorted_by_short_name() {
        let names: Vec<String> = fixture().routes().into_iter().map(|r| r.route_short_name).collect();
        assert_eq!(names, vec!["202", "T789"]);
    }

    #[test]
    fn route_stops_follow_sequence_per_direction() {
        let feed = fixture();
        let outbound = feed.route_stops("T789", 0).unwrap();
        let ids: Vec<&str> = outbound.stops.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(outbound.stops[0].sequence, 1);

        let inbound = feed.route_stops("T789", 1).unwrap();
        let ids: Vec<&str> = inbound.stops.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B", "A"]);
    }

    #[test]
    fn unknown_route_and_direction() {
        let feed = fixture();
        assert!(matches!(feed.route_stops("nope", 0), Err(GtfsError::RouteNotFound(_))));
        assert!(matches!(feed.route_path("202", 1), Err(GtfsError::NoTripForDirection { .. })));
    }

    #[test]
    fn route_path_uses_ordered_shape() {
        let path = fixture().route_path("T789", 0).unwrap();
        assert_eq!(path.coordinates, vec![[38.40, 27.10], [38.41, 27.11], [38.42, 27.12]]);
        assert_eq!(path.stops.len(), 3);
    }

    #[test]
    fn route_without_shape_has_empty_path() {
        let path = fixture().route_path("202", 0).unwrap();
        assert!(path.coordinates.is_empty());
        assert_eq!(path.stops.len(), 2);
    }

    #[test]
    fn stop_search_is_case_insensitive() {
        let feed = fixture();
        let found: Vec<String> = feed.search_stops("kona", 10).into_iter().map(|s| s.id).collect();
        assert_eq!(found, vec!["B"]);
        assert_eq!(feed.search_stops("", 10).len(), 0);
        assert_eq!(feed.search_stops("a", 1).len(), 1);
    }

    #[test]
    fn departures_respect_calendar_and_time() {
        let feed = fixture();
        let monday = date(2026, 10, 19);
        let all: Vec<String> = feed
            .departures("B", monday, 0, 10)
            .unwrap()
            .into_iter()
            .map(|d| d.trip_id)
            .collect();
        assert_eq!(all, vec!["T789_IN_1", "T789_OUT_1", "202_1"]);

        let later: Vec<String> = feed
            .departures("B", monday, 8 * 3600, 10)
            .unwrap()
            .into_iter()
            .map(|d| d.trip_id)
            .collect();
        assert_eq!(later, vec!["T789_OUT_1", "202_1"]);

        // Weekday-only service drops out on Sunday; 202 has no calendar row.
        let sunday: Vec<String> = feed
            .departures("B", date(2026, 10, 18), 0, 10)
            .unwrap()
            .into_iter()
            .map(|d| d.trip_id)
            .collect();
        assert_eq!(sunday, vec!["202_1"]);

        assert!(matches!(feed.departures("ZZ", monday, 0, 10), Err(GtfsError::StopNotFound(_))));
    }

    #[test]
    fn bad_stop_time_does_not_hide_the_rest() {
        let stop_time = |trip_id: &str, departure_time: &str| StopTime {
            trip_id: trip_id.into(),
            arrival_time: departure_time.into(),
            departure_time: departure_time.into(),
            stop_id: "S".into(),
            stop_sequence: 1,
            stop_headsign: None,
        };
        let trip = |trip_id: &str| Trip {
            route_id: "R".into(),
            service_id: "ALL".into(),
            trip_id: trip_id.into(),
            shape_id: None,
            trip_headsign: None,
            direction_id: None,
        };
        let feed = GtfsFeed::from_tables(
            vec![],
            vec![trip("good"), trip("broken"), trip("huge")],
            vec![
                stop_time("good", "10:00:00"),
                stop_time("broken", "ten o'clock"),
                stop_time("huge", "4000000:00:00"),
            ],
            vec![Stop {
                stop_id: "S".into(),
                stop_name: "Basmane".into(),
                stop_desc: String::new(),
                stop_lat: 38.42,
                stop_lon: 27.14,
            }],
            vec![],
            vec![],
        );
        let found: Vec<String> = feed
            .departures("S", date(2026, 10, 19), 0, 10)
            .unwrap()
            .into_iter()
            .map(|d| d.trip_id)
            .collect();
        assert_eq!(found, vec!["good"]);
    }
}
