//! End-to-end runs over an on-disk archive fixture.

use chrono::NaiveDate;
use floodex_scout::aoi::GeoJsonAoiSource;
use floodex_scout::pipeline::BatchSummary;
use floodex_scout::{
    load_catalog, Algorithm, AoiSelector, AoiSource, BatchRunner, DatasetBuilder, ExtentProcessor,
    FileRegisterBuilder, FloodexConfig, GrammarTable, Indexer, Layer, LayersProcessor, Ledger,
    LayoutVersion, MetricsExtractor, ProcessingStatus, SelectionStage, SpatialDataset, TileIndex,
};
use floodex_test_utils::{ensemble_name, legacy_hm_name, provider_name, ArchiveFixture, GRID};
use std::fs;
use std::sync::Arc;

const NEAR: &str = "E051N012T3";
const FAR: &str = "E060N030T3";

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Tile index with one tile under the AOI and one far away, plus a plain AOI.
fn seed_geometry(fx: &ArchiveFixture, event_id: &str) {
    fx.write_tile_index(&[
        (GRID, NEAR, [45.0, 12.0, 46.0, 13.0]),
        (GRID, FAR, [30.0, 30.0, 31.0, 31.0]),
    ]);
    fx.write_aoi(
        event_id,
        &[vec![(12.2, 45.2), (12.8, 45.2), (12.8, 45.8), (12.2, 45.8), (12.2, 45.2)]],
    );
}

fn builder(config: &FloodexConfig) -> FileRegisterBuilder {
    let tiles = TileIndex::load(&config.paths.tile_index).unwrap();
    FileRegisterBuilder::new(GrammarTable::default(), Arc::new(tiles))
        .with_max_polygon_vertices(config.selection.max_polygon_vertices)
}

fn run_extent(config: &FloodexConfig, algorithms: Vec<Algorithm>) -> (BatchSummary, Ledger) {
    let indexer = Indexer::new(config.storage_layout().unwrap());
    let builder = builder(config);
    let metrics = MetricsExtractor::new(
        config.pixel_counter(),
        config.raster.pixel_size_m,
        config.processing_mode(),
    )
    .unwrap();
    let processor = ExtentProcessor {
        indexer: &indexer,
        builder: &builder,
        selector: config.selector(),
        metrics: &metrics,
        grammars: GrammarTable::default(),
        results_dir: config.paths.results_dir.clone(),
        buffer_days: config.run.buffer_days,
    };

    let events = load_catalog(&config.paths.catalog).unwrap();
    let ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
    let mut ledger =
        Ledger::open_or_create(&config.extent_ledger_path(), &ids, config.run.flush).unwrap();
    let aoi = GeoJsonAoiSource::new(&config.paths.aoi_dir);
    let runner = BatchRunner::new(
        &aoi,
        &config.paths.results_dir,
        &config.paths.results_dir,
        algorithms,
    );
    let summary = runner.run(&processor, &events, &mut ledger, |_| {}).unwrap();
    (summary, ledger)
}

fn run_layers(config: &FloodexConfig) -> (BatchSummary, Ledger) {
    let indexer = Indexer::new(config.storage_layout().unwrap());
    let builder = builder(config);
    let processor = LayersProcessor {
        indexer: &indexer,
        builder: &builder,
        selector: AoiSelector::default(),
        grammars: GrammarTable::default(),
        layers_dir: config.paths.layers_dir.clone(),
        buffer_days: config.run.layers_buffer_days,
    };
    let events = load_catalog(&config.paths.catalog).unwrap();
    let ids: Vec<String> = events.iter().map(|e| e.id.clone()).collect();
    let mut ledger =
        Ledger::open_or_create(&config.layers_ledger_path(), &ids, config.run.flush).unwrap();
    let aoi = GeoJsonAoiSource::new(&config.paths.aoi_dir);
    let layers_dir = &config.paths.layers_dir;
    let runner = BatchRunner::new(&aoi, layers_dir, layers_dir.join("completed"), vec![Algorithm::Ensemble]);
    let summary = runner.run(&processor, &events, &mut ledger, |_| {}).unwrap();
    (summary, ledger)
}

fn read_results(path: &std::path::Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[test]
fn test_legacy_only_files_indexed_within_buffered_window() {
    let fx = ArchiveFixture::new();
    let root = fx.nrt_root();
    let jan2 = fx.day_dir(&root, "interim_layers", "flood_extent", GRID, day(2023, 1, 2));
    let legacy = fx.write_raster(&jan2, &legacy_hm_name("20230102T051500", GRID, NEAR), &[1, 1, 1, 0]);
    fx.write_raster(&jan2, &legacy_hm_name("20230102T051500", GRID, FAR), &[1, 0, 0, 0]);
    fx.touch(&jan2, "FLOOD-HM_20230102T051500_VVH_A099_E051N012T3_EU020M_V0M2R2_S1.tif.aux.xml");
    let jan5 = fx.day_dir(&root, "interim_layers", "flood_extent", GRID, day(2023, 1, 5));
    fx.write_raster(&jan5, &legacy_hm_name("20230105T051500", GRID, NEAR), &[1, 1, 1, 1]);

    seed_geometry(&fx, "FL2001");
    fx.write_catalog(&[("FL2001", "Italy", "2023-01-01", "2023-01-03", GRID)]);
    let config = FloodexConfig::load(&fx.write_config()).unwrap();

    let event = &load_catalog(&config.paths.catalog).unwrap()[0];
    let indexer = Indexer::new(config.storage_layout().unwrap());
    let files = indexer
        .find_images(event.from, event.to, GRID, Algorithm::Tuw, 1)
        .unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.contains(&legacy));
    assert!(files.iter().all(|f| f.starts_with(&jan2)));

    let (_, ledger) = run_extent(&config, vec![Algorithm::Tuw]);
    assert_eq!(ledger.status("FL2001", Algorithm::Tuw), Some(ProcessingStatus::Detected));

    let rows = read_results(&config.paths.results_dir.join("FL2001_tuw.csv"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][2], "AOI_1");
    assert_eq!(rows[0][3], "2023-01-02T05:15:00");
    assert_eq!(rows[0][5], NEAR);
    let km2: f64 = rows[0][4].parse().unwrap();
    assert!((km2 - 3.0 * 0.0004).abs() < 1e-12);
}

#[test]
fn test_too_complex_aoi_selected_after_simplification() {
    let fx = ArchiveFixture::new();
    let dir = fx.day_dir(&fx.nrt_root(), "layers", "flood_extent", GRID, day(2023, 8, 1));
    fx.write_raster(&dir, &ensemble_name("20230801T043012", GRID, NEAR), &[1, 1, 0, 0]);
    fx.write_raster(&dir, &ensemble_name("20230801T043012", GRID, FAR), &[1, 1, 1, 1]);
    seed_geometry(&fx, "FL2002");
    // square with an outward bump of 0.025 degrees mid-edge
    fx.write_aoi(
        "FL2002",
        &[vec![
            (12.2, 45.2),
            (12.5, 45.175),
            (12.8, 45.2),
            (12.825, 45.5),
            (12.8, 45.8),
            (12.5, 45.825),
            (12.2, 45.8),
            (12.175, 45.5),
            (12.2, 45.2),
        ]],
    );
    fx.write_catalog(&[("FL2002", "Italy", "2023-08-01T00:00:00", "2023-08-01T23:00:00", GRID)]);
    let mut config = FloodexConfig::load(&fx.write_config()).unwrap();
    config.selection.max_polygon_vertices = 5;

    let aoi = GeoJsonAoiSource::new(&config.paths.aoi_dir)
        .load("FL2002")
        .unwrap()
        .unwrap();
    let indexer = Indexer::new(config.storage_layout().unwrap());
    let event = &load_catalog(&config.paths.catalog).unwrap()[0];
    let files = indexer
        .find_images(event.from, event.to, GRID, Algorithm::Ensemble, 1)
        .unwrap();
    let grammars = GrammarTable::default();
    let grammar = grammars
        .lookup(Algorithm::Ensemble, Layer::FloodExtent, LayoutVersion::NearRealTime)
        .unwrap();
    let dataset = builder(&config)
        .build(&files, Algorithm::Ensemble, Layer::FloodExtent, LayoutVersion::NearRealTime, grammar)
        .unwrap();
    assert_eq!(dataset.len(), 2);

    let selections = config.selector().select_event(&dataset, &aoi).unwrap();
    assert_eq!(selections.len(), 1);
    let (polygon, selection) = &selections[0];
    assert_eq!(*polygon, 0);
    assert!(matches!(selection.stage, SelectionStage::Simplified { step: 3, .. }));
    assert_eq!(selection.dataset.len(), 1);

    let (summary, ledger) = run_extent(&config, vec![Algorithm::Ensemble]);
    assert_eq!(summary.count(ProcessingStatus::Detected), 1);
    assert_eq!(ledger.status("FL2002", Algorithm::Ensemble), Some(ProcessingStatus::Detected));
    let rows = read_results(&config.paths.results_dir.join("FL2002_ensemble.csv"));
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][5], NEAR);
}

#[test]
fn test_zero_flooded_pixels_marks_results_missed() {
    let fx = ArchiveFixture::new();
    let dir = fx.day_dir(&fx.nrt_root(), "interim_layers", "flood_extent", GRID, day(2023, 3, 10));
    fx.write_raster(&dir, &provider_name("DLR", "20230310T170102", GRID, NEAR), &[0, 0, 255, 255]);
    fx.write_raster(&dir, &provider_name("DLR", "20230310T170102", GRID, FAR), &[1, 1, 1, 1]);
    let next = fx.day_dir(&fx.nrt_root(), "interim_layers", "flood_extent", GRID, day(2023, 3, 11));
    fx.write_raster(&next, &provider_name("DLR", "20230311T052040", GRID, NEAR), &[0, 0, 0, 0]);
    seed_geometry(&fx, "FL2003");
    fx.write_catalog(&[("FL2003", "Spain", "2023-03-10", "2023-03-11", GRID)]);
    let config = FloodexConfig::load(&fx.write_config()).unwrap();

    let (_, ledger) = run_extent(&config, vec![Algorithm::Dlr]);

    assert_eq!(ledger.status("FL2003", Algorithm::Dlr), Some(ProcessingStatus::Missed));
    let missed = config.paths.results_dir.join("FL2003_dlr_MISSED.csv");
    assert!(missed.exists());
    assert!(!config.paths.results_dir.join("FL2003_dlr.csv").exists());
    assert!(!config.paths.results_dir.join("FL2003_dlr.csv.part").exists());
    assert!(read_results(&missed).is_empty());
    let header = fs::read_to_string(&missed).unwrap();
    assert_eq!(header.trim(), "event_id,country,aoi,timestamp,extent_km2,tile_name");

    // the ledger on disk says the same
    let reloaded = Ledger::load(&config.extent_ledger_path()).unwrap();
    assert_eq!(reloaded.status("FL2003", Algorithm::Dlr), Some(ProcessingStatus::Missed));
}

#[test]
fn test_rerun_skips_finished_pairs() {
    let fx = ArchiveFixture::new();
    let dir = fx.day_dir(&fx.nrt_root(), "layers", "flood_extent", GRID, day(2023, 8, 1));
    fx.write_raster(&dir, &ensemble_name("20230801T043012", GRID, NEAR), &[1, 0, 0, 0]);
    fx.write_raster(&dir, &ensemble_name("20230801T043012", GRID, FAR), &[1, 0, 0, 0]);
    seed_geometry(&fx, "FL2004");
    fx.write_catalog(&[
        ("FL2004", "Italy", "2023-08-01", "2023-08-01", GRID),
        ("FL2005", "Italy", "2023-08-01", "2023-08-01", GRID),
    ]);
    let config = FloodexConfig::load(&fx.write_config()).unwrap();
    let algorithms = vec![Algorithm::Ensemble, Algorithm::List];

    let (first, _) = run_extent(&config, algorithms.clone());
    assert_eq!(first.events, 2);
    assert_eq!(first.skipped, 0);
    assert_eq!(first.count(ProcessingStatus::Detected), 1);
    assert_eq!(first.count(ProcessingStatus::NoData), 1);
    assert_eq!(first.count(ProcessingStatus::NoAoi), 2);
    assert!(config.paths.results_dir.join("no_aoi/FL2005.txt").exists());
    assert!(config.paths.results_dir.join("no_data_at_all/FL2004_list.txt").exists());

    // with the archive gone, a detected pair that ran again would become no_data
    fs::remove_dir_all(fx.nrt_root()).unwrap();
    let (second, ledger) = run_extent(&config, algorithms);

    assert_eq!(second.skipped, 3);
    assert_eq!(second.count(ProcessingStatus::NoData), 1);
    assert_eq!(ledger.status("FL2004", Algorithm::Ensemble), Some(ProcessingStatus::Detected));
    assert_eq!(ledger.status("FL2004", Algorithm::List), Some(ProcessingStatus::NoData));
    assert_eq!(ledger.status("FL2005", Algorithm::List), Some(ProcessingStatus::NoAoi));
}

#[test]
fn test_layers_copied_per_aoi_polygon() {
    let fx = ArchiveFixture::new();
    let root = fx.nrt_root();
    fx.create_layer_dirs(&root, GRID);
    let d = day(2023, 8, 1);
    let extent = fx.day_dir(&root, "layers", "flood_extent", GRID, d);
    fx.write_raster(&extent, &ensemble_name("20230801T043012", GRID, NEAR), &[1, 0]);
    fx.write_raster(&extent, &ensemble_name("20230801T043012", GRID, FAR), &[1, 0]);
    let uncertainty = fx.day_dir(&root, "layers", "uncertainty", GRID, d);
    fx.write_raster(
        &uncertainty,
        "ENSEMBLE_UNCERTAINTY_20230801T043012_VV_EU020M_E051N012T3.tif",
        &[10, 20],
    );
    fx.write_raster(
        &uncertainty,
        "ENSEMBLE_UNCERTAINTY_20230801T043012_VV_EU020M_E060N030T3.tif",
        &[10, 20],
    );
    seed_geometry(&fx, "FL2006");
    fx.write_catalog(&[("FL2006", "Italy", "2023-08-01", "2023-08-01", GRID)]);
    let config = FloodexConfig::load(&fx.write_config()).unwrap();

    let layers_dir = &config.paths.layers_dir;
    let (first, ledger) = run_layers(&config);
    assert_eq!(first.count(ProcessingStatus::Done), 1);
    assert_eq!(ledger.status("FL2006", Algorithm::Ensemble), Some(ProcessingStatus::Done));

    let event_dir = layers_dir.join("FL2006").join("ensemble_nrt");
    let copied = event_dir
        .join("flood_extent/AOI_1")
        .join(ensemble_name("20230801T043012", GRID, NEAR));
    assert!(copied.exists());
    assert!(!event_dir
        .join("flood_extent/AOI_1")
        .join(ensemble_name("20230801T043012", GRID, FAR))
        .exists());
    assert!(event_dir
        .join("uncertainty/AOI_1/ENSEMBLE_UNCERTAINTY_20230801T043012_VV_EU020M_E051N012T3.tif")
        .exists());
    assert!(layers_dir.join("no_data_dc_filter/FL2006_ensemble_exclusion.txt").exists());
    assert!(layers_dir.join("completed/FL2006_ensemble.txt").exists());

    // completed marker makes the pair resumable
    let (second, _) = run_layers(&config);
    assert_eq!(second.skipped, 1);
}

#[test]
fn test_layers_continue_after_empty_flood_extent_selection() {
    let fx = ArchiveFixture::new();
    let root = fx.nrt_root();
    fx.create_layer_dirs(&root, GRID);
    let d = day(2023, 8, 1);
    let extent = fx.day_dir(&root, "layers", "flood_extent", GRID, d);
    fx.write_raster(&extent, &ensemble_name("20230801T043012", GRID, FAR), &[1, 0]);
    let uncertainty = fx.day_dir(&root, "layers", "uncertainty", GRID, d);
    let near_uncertainty = "ENSEMBLE_UNCERTAINTY_20230801T043012_VV_EU020M_E051N012T3.tif";
    fx.write_raster(&uncertainty, near_uncertainty, &[10, 20]);
    fx.write_raster(
        &uncertainty,
        "ENSEMBLE_UNCERTAINTY_20230801T043012_VV_EU020M_E060N030T3.tif",
        &[10, 20],
    );
    seed_geometry(&fx, "FL2007");
    fx.write_catalog(&[("FL2007", "Italy", "2023-08-01", "2023-08-01", GRID)]);
    let config = FloodexConfig::load(&fx.write_config()).unwrap();
    let layers_dir = &config.paths.layers_dir;

    let (_, ledger) = run_layers(&config);

    assert_eq!(ledger.status("FL2007", Algorithm::Ensemble), Some(ProcessingStatus::Done));
    assert!(layers_dir
        .join("no_data_dc_filter/FL2007_ensemble_flood_extent.txt")
        .exists());
    let event_dir = layers_dir.join("FL2007").join("ensemble_nrt");
    assert!(!event_dir.join("flood_extent").exists());
    assert!(event_dir.join("uncertainty/AOI_1").join(near_uncertainty).exists());
    assert!(!layers_dir.join("no_data/FL2007_ensemble.txt").exists());
    assert!(layers_dir.join("completed/FL2007_ensemble.txt").exists());
}

#[test]
fn test_layers_no_data_when_every_selection_is_empty() {
    let fx = ArchiveFixture::new();
    let root = fx.nrt_root();
    fx.create_layer_dirs(&root, GRID);
    let extent = fx.day_dir(&root, "layers", "flood_extent", GRID, day(2023, 8, 1));
    fx.write_raster(&extent, &ensemble_name("20230801T043012", GRID, FAR), &[1, 0]);
    seed_geometry(&fx, "FL2008");
    fx.write_catalog(&[("FL2008", "Italy", "2023-08-01", "2023-08-01", GRID)]);
    let config = FloodexConfig::load(&fx.write_config()).unwrap();
    let layers_dir = &config.paths.layers_dir;

    let (first, ledger) = run_layers(&config);

    assert_eq!(ledger.status("FL2008", Algorithm::Ensemble), Some(ProcessingStatus::NoData));
    assert!(layers_dir
        .join("no_data_dc_filter/FL2008_ensemble_flood_extent.txt")
        .exists());
    assert!(layers_dir.join("no_data/FL2008_ensemble.txt").exists());
    assert!(!layers_dir.join("completed/FL2008_ensemble.txt").exists());
    assert_eq!(first.skipped, 0);

    let (second, _) = run_layers(&config);
    assert_eq!(second.skipped, 1);
}
