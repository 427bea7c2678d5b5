use simple_pario::attribute::attach_scalar;
use simple_pario::group::{Communicator, LocalGroup};
use simple_pario::layout::{partitions, Layout};
use simple_pario::selection::{select, Dataspace};
use simple_pario::store::{ArrayFile, FileAccess};
use simple_pario::{CollectiveWriter, Error};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn four_workers_write_rank_plus_one_elements() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let writer = CollectiveWriter::new(dir.path().join("stuff.pario"), "ranks");

    let layouts = LocalGroup::run(4, |comm| {
        let local = vec![comm.rank() as i32; comm.rank() + 1];
        let layout = writer.write(&comm, &local, |rank| rank as i64 + 1)?;
        comm.finalize()?;
        Ok::<_, Error>(layout)
    });

    let layouts: Vec<Layout> = layouts.into_iter().map(Result::unwrap).collect();
    assert_eq!(layouts, partitions(4, |rank| rank as i64 + 1).unwrap());
    assert_eq!(
        writer.read::<i32>().unwrap(),
        vec![0, 1, 1, 2, 2, 2, 3, 3, 3, 3]
    );
}

#[test]
fn each_rank_writes_its_rank() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let writer = CollectiveWriter::new(dir.path().join("parallel_out.pario"), "MPI_RANKS");

    LocalGroup::run(6, |comm| {
        writer.write(&comm, &[comm.rank() as i32], |_| 1).unwrap();
    });
    assert_eq!(writer.read::<i32>().unwrap(), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn exchanged_sizes_need_no_shared_formula() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let writer = CollectiveWriter::new(dir.path().join("exchanged.pario"), "values");

    // Sizes 3, 0, 1, 2: not a function every worker could evaluate without asking.
    let sizes = [3usize, 0, 1, 2];
    LocalGroup::run(4, |comm| {
        let local: Vec<i64> = (0..sizes[comm.rank()])
            .map(|i| comm.rank() as i64 * 10 + i as i64)
            .collect();
        writer.write_exchanged(&comm, &local).unwrap();
    });
    assert_eq!(
        writer.read::<i64>().unwrap(),
        vec![0, 1, 2, 20, 30, 31]
    );
}

#[test]
fn step_by_step_collective_write() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("steps.pario");

    let results = LocalGroup::run(3, |comm| -> simple_pario::Result<()> {
        let layout = Layout::resolve(comm.rank(), comm.size(), |r| 2 * r as i64 + 1)?;
        let local: Vec<u32> = (0..layout.extent).map(|i| (layout.offset + i) as u32).collect();

        let access = FileAccess::parallel(&comm);
        let file = ArrayFile::create(&path, &access)?;
        let global_space = Dataspace::simple(&[layout.global_extent])?;
        let dataset = file.create_dataset::<u32>("sequence", &global_space)?;
        let local_space = Dataspace::simple(&[layout.extent])?;
        let file_selection = select(&global_space, layout.offset, layout.extent)?;
        let memory_selection = local_space.select_all();
        dataset.write(&memory_selection, &file_selection, &local)?;

        assert_eq!(dataset.read::<u32>()?, (0..9).collect::<Vec<u32>>());
        Ok(())
    });
    assert!(results.iter().all(Result::is_ok));
}

#[test]
fn region_beyond_the_shape_is_out_of_bounds() {
    let space = Dataspace::simple(&[6]).unwrap();
    let err = select(&space, 5, 3).unwrap_err();
    assert!(matches!(err, Error::OutOfBounds { .. }));
}

#[test]
fn single_writer_matrix_with_attribute() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("matrix.pario");
    let matrix: Vec<i32> = (0..20).collect();

    CollectiveWriter::new(&path, "IntegerMatrix")
        .with_row_shape(&[5])
        .write_single_with_attribute(&matrix, "meta", 42i32)
        .unwrap();

    let access = FileAccess::independent();
    let file = ArrayFile::open(&path, &access).unwrap();
    let dataset = file.dataset("IntegerMatrix").unwrap();
    assert_eq!(dataset.shape(), &[4, 5]);
    for r in 0..4u64 {
        for c in 0..5u64 {
            assert_eq!(
                dataset.read_element::<i32>(&[r, c]).unwrap(),
                (5 * r + c) as i32
            );
        }
    }

    assert_eq!(dataset.read_scalar_attribute::<i32>("meta").unwrap(), 42);
    let err = attach_scalar(&dataset, "meta", 42i32).unwrap_err();
    assert!(matches!(err, Error::DuplicateName(_)));
}

#[test]
fn negative_contribution_fails_every_worker() {
    let dir = tempfile::tempdir().unwrap();
    let writer = CollectiveWriter::new(dir.path().join("negative.pario"), "d");
    let results = LocalGroup::run(2, |comm| {
        writer.write(&comm, &[0i8], |rank| if rank == 1 { -3 } else { 1 })
    });
    for result in results {
        assert_eq!(result.unwrap_err().kind(), "ConfigurationError");
    }
    assert!(!dir.path().join("negative.pario").exists());
}
