use egs_core::plan::{ArchivePlan, PlanError};
use egs_core::types::CellId;

#[test]
fn archive_count_is_floor_of_total_over_samples_per_iter() {
    let plan = ArchivePlan::new(1500, 300, 1000, 2).unwrap();
    assert_eq!(plan.num_archives, 5);
    assert_eq!(plan.cell_quota, 150);

    let plan = ArchivePlan::new(1599, 300, 1000, 2).unwrap();
    assert_eq!(plan.num_archives, 5);
    assert_eq!(plan.cell_quota, 159);
}

#[test]
fn archive_count_is_at_least_one() {
    let plan = ArchivePlan::new(10, 300, 1000, 4).unwrap();
    assert_eq!(plan.num_archives, 1);
    assert_eq!(plan.cell_quota, 2);

    let plan = ArchivePlan::new(0, 300, 1000, 4).unwrap();
    assert_eq!(plan.num_archives, 1);
    assert_eq!(plan.cell_quota, 0);
}

#[test]
fn archive_count_is_capped_by_max_archives() {
    let plan = ArchivePlan::new(1_000_000, 10, 7, 3).unwrap();
    assert_eq!(plan.num_archives, 7);
    assert_eq!(plan.cell_quota, 1_000_000 / 21);
}

#[test]
fn zero_parameters_are_rejected() {
    assert_eq!(
        ArchivePlan::new(10, 0, 1, 1),
        Err(PlanError::ZeroSamplesPerIter)
    );
    assert_eq!(ArchivePlan::new(10, 1, 0, 1), Err(PlanError::ZeroMaxArchives));
    assert_eq!(ArchivePlan::new(10, 1, 1, 0), Err(PlanError::ZeroJobs));
}

#[test]
fn cells_are_row_major_job_then_archive() {
    let plan = ArchivePlan::new(600, 300, 1000, 2).unwrap();
    let cells: Vec<(u32, u32)> = plan.cells().map(|c| (c.job, c.archive)).collect();
    assert_eq!(cells, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
    assert_eq!(plan.num_cells(), 4);

    for (i, cell) in plan.cells().enumerate() {
        assert_eq!(plan.cell_index(cell), Some(i));
    }
    assert_eq!(plan.cell_index(CellId { job: 3, archive: 1 }), None);
    assert_eq!(plan.cell_index(CellId { job: 0, archive: 1 }), None);

    assert!(plan.is_last_cell(CellId { job: 2, archive: 2 }));
    assert!(!plan.is_last_cell(CellId { job: 2, archive: 1 }));
}
