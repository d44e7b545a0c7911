use std::time::Duration;

use busboard::{AnimatorSettings, LatLng, RouteAnimator, RoutePath, Snapshot, Status, StopRecord};

fn izmir_path() -> RoutePath {
    RoutePath {
        route_id: "T789".to_string(),
        direction: 0,
        coordinates: vec![[38.40, 27.10], [38.41, 27.11], [38.42, 27.12]],
        stops: vec![StopRecord {
            id: "A".to_string(),
            name: "Alsancak".to_string(),
            lat: 38.405,
            lng: 27.105,
            sequence: 1,
        }],
    }
}

async fn collect_run(updates: &mut tokio::sync::mpsc::UnboundedReceiver<Snapshot>) -> Vec<Snapshot> {
    let mut seen = Vec::new();
    while let Some(snapshot) = updates.recv().await {
        let done = snapshot.status.is_final();
        seen.push(snapshot);
        if done {
            break;
        }
    }
    seen
}

#[tokio::test(start_paused = true)]
async fn bus_crosses_izmir_route() {
    let settings = AnimatorSettings {
        speed_kmh: 30.0,
        tick_interval: Duration::from_millis(250),
    };
    let (mut animator, mut updates) = RouteAnimator::new(settings);
    let path = izmir_path();
    animator.start(path.polyline(), path.stops.clone(), path.direction);

    let seen = collect_run(&mut updates).await;
    assert_eq!(seen.len(), 3);

    let start = &seen[0];
    assert_eq!(start.status, Status::Started);
    assert_eq!(start.state.position, Some(LatLng::new(38.40, 27.10)));
    let d0 = start.state.remaining_distance_m.unwrap();
    let t0 = start.state.remaining_time_s.unwrap();
    assert!((d0 - 2_825.3).abs() < 1.0, "got {d0}");
    assert!((t0 - d0 / (30.0 / 3.6)).abs() < 1e-6);

    let tick1 = &seen[1];
    assert_eq!(tick1.status, Status::Advanced);
    assert_eq!(tick1.state.current_index, 1);
    assert_eq!(tick1.state.nearest_stop.as_ref().unwrap().id, "A");
    assert!(tick1.state.remaining_distance_m.unwrap() < d0);

    let last = &seen[2];
    assert_eq!(last.status, Status::Arrived);
    assert_eq!(last.state.current_index, 2);
    assert_eq!(last.state.position, Some(LatLng::new(38.42, 27.12)));
    assert_eq!(last.state.remaining_distance_m, Some(0.0));
    assert_eq!(last.state.remaining_time_s, Some(0.0));
    assert_eq!(last.state.nearest_stop.as_ref().unwrap().id, "A");
}

#[tokio::test(start_paused = true)]
async fn single_point_route_never_ticks() {
    let (mut animator, mut updates) = RouteAnimator::new(AnimatorSettings::default());
    let run = animator.start(vec![LatLng::new(38.40, 27.10)], vec![], 0);

    let first = updates.recv().await.unwrap();
    assert_eq!(first.run, run);
    assert_eq!(first.status, Status::Arrived);
    assert_eq!(first.state.position, Some(LatLng::new(38.40, 27.10)));
    assert!(!animator.is_ticking());

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(updates.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn malformed_vertex_is_reported_not_raised() {
    let (mut animator, mut updates) = RouteAnimator::new(AnimatorSettings::default());
    let polyline = vec![LatLng::new(38.40, 27.10), LatLng::new(f64::NAN, 27.11), LatLng::new(38.42, 27.12)];
    animator.start(polyline, vec![], 0);

    let seen = collect_run(&mut updates).await;
    assert_eq!(seen.len(), 2);
    assert!(matches!(seen[1].status, Status::Failed(_)));
    assert_eq!(seen[1].state.position, None);
    assert_eq!(seen[1].state.remaining_distance_m, None);

    // A fresh start still works after the failure.
    let path = izmir_path();
    animator.start(path.polyline(), path.stops, 0);
    let seen = collect_run(&mut updates).await;
    assert_eq!(seen.last().unwrap().status, Status::Arrived);
}
