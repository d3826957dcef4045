use field2d::geom::loops::{LoopKind, SubdomainMarker};
use field2d::{CoordinateType, Diagnostic, Edge, Geometry, Label, Point, ResolveOptions, resolve};
use proptest::prelude::*;

fn add_rectangle(g: &mut Geometry, x0: f64, y0: f64, w: f64, h: f64) {
    let corners = [(x0, y0), (x0 + w, y0), (x0 + w, y0 + h), (x0, y0 + h)];
    let ids: Vec<usize> = corners
        .iter()
        .map(|&(x, y)| g.add_node(Point::new(x, y)).unwrap())
        .collect();
    for i in 0..4 {
        g.add_edge(Edge::new(ids[i], ids[(i + 1) % 4])).unwrap();
    }
}

#[test]
fn test_punctured_square_with_labelled_hole() {
    let mut g = Geometry::new(CoordinateType::Planar);
    add_rectangle(&mut g, 0., 0., 10., 10.);
    add_rectangle(&mut g, 4., 4., 2., 2.);
    g.add_label(Label::new(Point::new(1., 1.), "air")).unwrap();
    g.add_label(Label::new(Point::new(5., 5.), "copper")).unwrap();

    let res = resolve(&g, &ResolveOptions::default());
    assert!(res.is_valid(), "{:?}", res.diagnostics);
    assert_eq!(res.subdomains.len(), 2);

    let outer = res.label_subdomain[0].unwrap();
    let inner = res.label_subdomain[1].unwrap();
    assert_ne!(outer, inner);
    // The hole of the outer subdomain is the boundary of the inner one
    let hole = res.subdomains[outer].holes[0];
    assert_eq!(res.loops[hole].kind, LoopKind::Boundary);
    assert!((res.loops[hole].area.abs() - res.subdomains[inner].area).abs() < 1e-9);

    // Points inside the hole belong to the inner subdomain only
    let opts = ResolveOptions::default();
    assert_eq!(res.subdomains_at(&g, Point::new(5.5, 4.5), &opts).unwrap(), vec![inner]);
    assert_eq!(res.subdomains_at(&g, Point::new(8., 2.), &opts).unwrap(), vec![outer]);
    assert!(res.subdomains_at(&g, Point::new(11., 2.), &opts).unwrap().is_empty());
}

#[test]
fn test_dangling_node_does_not_close_a_subdomain() {
    let mut g = Geometry::new(CoordinateType::Planar);
    add_rectangle(&mut g, 0., 0., 1., 1.);
    let corner = g.find_node(Point::new(1., 1.), 1e-9).unwrap();
    let tip = g.add_node(Point::new(2., 2.)).unwrap();
    let spur = g.add_edge(Edge::new(corner, tip)).unwrap();
    g.add_label(Label::new(Point::new(0.5, 0.5), "air")).unwrap();

    let res = resolve(&g, &ResolveOptions::default());
    assert!(!res.is_valid());
    assert!(res.diagnostics.contains(&Diagnostic::DanglingNode { node: tip }));
    assert!(res.diagnostics.contains(&Diagnostic::DanglingEdge { edge: spur }));
    assert_eq!(res.subdomains.len(), 1);
    assert!(res.loops.iter().all(|l| !l.nodes.contains(&tip)));
}

#[test]
fn test_axisymmetric_geometry_rejects_negative_second_coordinate() {
    let mut g = Geometry::new(CoordinateType::Axisymmetric);
    assert!(g.add_node(Point::new(1., -5.)).is_err());
    assert!(g.add_node(Point::new(-1., 0.)).is_ok());
}

fn rectangles() -> impl Strategy<Value = Vec<(f64, f64, f64, f64)>> {
    prop::collection::vec((0.0..0.5f64, -1.0..1.0f64, 0.5..2.0f64, 0.5..2.0f64), 1..6)
}

proptest! {
    #[test]
    fn prop_each_label_is_assigned_once(rects in rectangles()) {
        let mut g = Geometry::new(CoordinateType::Planar);
        let mut centers = Vec::new();
        for (i, &(dx, y0, w, h)) in rects.iter().enumerate() {
            // Slots 3 units wide keep the rectangles disjoint
            let x0 = 3.0 * i as f64 + dx;
            add_rectangle(&mut g, x0, y0, w, h);
            let c = Point::new(x0 + w / 2., y0 + h / 2.);
            g.add_label(Label::new(c, &format!("m{i}"))).unwrap();
            centers.push(c);
        }

        let opts = ResolveOptions::default();
        let res = resolve(&g, &opts);
        prop_assert!(res.is_valid(), "{:?}", res.diagnostics);
        prop_assert_eq!(res.subdomains.len(), rects.len());

        let mut assigned = vec![0; rects.len()];
        for sd in &res.subdomains {
            match &sd.marker {
                SubdomainMarker::Material { label, .. } => assigned[*label] += 1,
                other => prop_assert!(false, "unresolved marker {:?}", other),
            }
        }
        prop_assert!(assigned.iter().all(|&n| n == 1));

        for (i, c) in centers.iter().enumerate() {
            let at = res.subdomains_at(&g, *c, &opts).unwrap();
            prop_assert_eq!(at.len(), 1);
            prop_assert_eq!(Some(at[0]), res.label_subdomain[i]);
        }

        prop_assert_eq!(resolve(&g, &opts), res);
    }

    #[test]
    fn prop_nested_rectangles_resolve_cleanly(
        (outer_w, outer_h) in (4.0..12.0f64, 4.0..12.0f64),
        (ax, ay) in (0.3..0.9f64, 0.005..0.9f64),
        (aw, ah) in (0.02..1.0f64, 0.02..1.0f64),
    ) {
        let mut g = Geometry::new(CoordinateType::Planar);
        add_rectangle(&mut g, 0., 0., outer_w, outer_h);
        let (x0, y0) = (outer_w * ax, outer_h * ay);
        // Inner rectangle keeps a margin of at least 10% of the free space
        let w = (outer_w - x0) * aw * 0.9;
        let h = (outer_h - y0) * ah * 0.9;
        add_rectangle(&mut g, x0, y0, w, h);
        g.add_label(Label::new(Point::new(x0 / 2., y0 + h / 2.), "air")).unwrap();
        g.add_label(Label::new(Point::new(x0 + w / 2., y0 + h / 2.), "copper")).unwrap();

        let res = resolve(&g, &ResolveOptions::default());
        prop_assert!(res.diagnostics.is_empty(), "{:?}", res.diagnostics);
        prop_assert_eq!(res.subdomains.len(), 2);
        prop_assert!(res.subdomains.iter().all(|sd| sd.area > 0.0));

        let air = res.label_subdomain[0].unwrap();
        let copper = res.label_subdomain[1].unwrap();
        prop_assert_ne!(air, copper);
        prop_assert_eq!(res.subdomains[air].holes.len(), 1);
        prop_assert!((res.subdomains[air].area - (outer_w * outer_h - w * h)).abs() < 1e-8);
        prop_assert!((res.subdomains[copper].area - w * h).abs() < 1e-8);
    }
}
