use std::{
    error::Error,
    fs::File,
    path::{Path, PathBuf},
};

use clap::{ArgGroup, Args, Parser, Subcommand};

use indicatif::{ProgressBar, ProgressStyle};
use pcaplot::{
    embedder::{Embedder, EmbedderOptions, LinearEmbedder},
    observer_error::ObserverError,
    pca_plotter::PcaPlotter,
    projection::Pca,
    surface::FigureSurface,
    train_embedder,
    training_observer::{EpochLogs, TrainingObserver},
    training_options::TrainingOptions,
    validate_embedder, EachEpoch, Sample,
};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{de::DeserializeOwned, Deserialize};

/// A simple CLI for training embedding models while watching a PCA projection of their embeddings. Appropriate for datasets that can be loaded into memory.
#[derive(Parser, Debug, Clone)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// log epoch results to stdout in addition to drawing on the terminal, allowing output to be piped
    #[arg(long, default_value = "false", global = true)]
    log_output: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Build a new embedding model and train it on the provided data, plotting its embeddings of the validation data after every epoch
    Train(TrainArgs),
    /// Load an existing model and plot its embeddings of the provided data
    Project(ProjectArgs),
}

#[derive(Args, Clone, Debug)]
#[command(group(ArgGroup::new("output").required(true).multiple(false)))]
struct TrainArgs {
    /// path to the file containing the training data.
    /// The file format is determined by the file extension. Supported formats are: pickle, json, avro
    /// Features should be in an ordered list in single column/field named 'features', and labels should be in a single column/field named 'label'
    #[arg(short = 'd', long = "data")]
    data_file: PathBuf,

    /// A comma-separated list of classes to train on.
    /// Any data points with labels not in this list will be ignored
    #[arg(short, long, required = true, value_delimiter = ',')]
    classes: Vec<String>,

    /// the length of the embeddings the model produces
    #[arg(long = "embedding-dim", default_value = "2")]
    embedding_dimension: usize,

    #[arg(short = 'e', long, visible_alias = "epochs", default_value = "20")]
    /// number of epochs to train the model for
    num_epochs: usize,

    #[arg(long, alias = "lr", default_value = "0.01")]
    /// the learning rate used to update the model weights
    learning_rate: f64,

    #[arg(long, default_value = "1.0")]
    /// the triplet loss margin
    margin: f64,

    #[arg(long, default_value = "32")]
    /// number of triplets per weight update
    batch_size: usize,

    #[arg(long)]
    /// if set, the model will be run against the validation data after each epoch, and the loss will be reported to the observer
    validate_each_epoch: bool,

    #[arg(long, alias = "eval-split", default_value = "0.2")]
    /// the fraction of the data held out for validation. The held-out data is also the data whose embeddings are plotted
    validation_split: f64,

    /// path of the figure to keep up to date during training. The path must end in .svg
    #[arg(long)]
    figure: PathBuf,

    /// path to the output file for the model weights. Supported file extensions are .pkl, .json, and .cbor
    #[arg(short = 'o', long = "model-out", group = "output")]
    model_output_file: Option<PathBuf>,

    /// if set, the model will not be saved to a file after training
    #[arg(long, group = "output")]
    no_save: bool,
}

#[derive(Args, Clone, Debug)]
struct ProjectArgs {
    /// path to the model weights file.
    model_input_file: PathBuf,

    /// path to the file containing the data to plot
    #[arg(short = 'd', long = "data")]
    data_file: PathBuf,

    /// A comma-separated list of classes to plot. Any data points with labels not in this list will be ignored
    #[arg(short, long, required = true, value_delimiter = ',')]
    classes: Vec<String>,

    /// path of the figure to write. The path must end in .svg
    #[arg(long)]
    figure: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    println!("Using arguments {cli:?}");
    match cli.command {
        Commands::Train(train_args) => {
            // check the output file extension to make sure we can save it later. If not, better to fail now than after training
            if let Some(output_file_path) = &train_args.model_output_file {
                validate_output_file_extension(output_file_path)?;
            }
            let training_options = TrainingOptions::new(
                train_args.num_epochs,
                train_args.batch_size,
                train_args.learning_rate,
                train_args.margin,
            )?;

            let (training_data, validation_data) = load_classification_data(
                &train_args.data_file,
                train_args.validation_split,
                &train_args.classes,
            )?;
            let input_dimension = training_data
                .first()
                .map(|sample| sample.features().len())
                .ok_or("UNABLE TO TRAIN: no training data with a listed class")?;

            let (inputs, labels) = unzip_samples(plotted_samples(&training_data, &validation_data));
            let plotter = PcaPlotter::new(&inputs, &labels, FigureSurface::new(&train_args.figure)?)?;
            let progress = TrainingProgress::new(train_args.num_epochs as u64, cli.log_output)?;
            println!("Plotting to file: {:?}", train_args.figure);

            let passed_validation_data = if train_args.validate_each_epoch {
                EachEpoch::ValidateModel(&validation_data)
            } else {
                EachEpoch::DoNotValidateModel
            };
            let untrained_model = LinearEmbedder::new(&EmbedderOptions {
                input_dimension,
                embedding_dimension: train_args.embedding_dimension,
            });

            // run the training loop on the model, reporting to both observers
            let mut observers = (progress, plotter);
            let trained_model = train_embedder(
                untrained_model,
                &training_data,
                passed_validation_data,
                &mut observers,
                training_options,
            )?;
            let (progress, _plotter) = observers;

            // the final validation can fail on a single-class held-out set, so the model is saved first
            if let Some(model_output_file) = &train_args.model_output_file {
                serialize_model(model_output_file, &trained_model)?;
            }
            if !train_args.validate_each_epoch && !validation_data.is_empty() {
                // we didn't validate each epoch, so we need to validate the model now
                progress.into_inner().println(format!(
                    "{} {}",
                    chrono::Local::now(),
                    final_validation_message(&trained_model, &validation_data, train_args.margin)
                ));
            } else {
                progress.into_inner().finish_with_message("Training complete");
            }
            Ok(())
        }
        Commands::Project(project_args) => {
            let model = deserialize_model(&project_args.model_input_file)?;
            let (data, _) =
                load_classification_data(&project_args.data_file, 0.0, &project_args.classes)?;
            let (inputs, labels) = unzip_samples(&data);

            // the plotter embeds and fits again for the figure; this fit only reports the variance
            let fit = Pca::new().fit(&model.embed(&inputs)?)?;
            let [first, second] = fit.explained_variance_ratio();
            println!(
                "Explained variance ratio: PC1 {:.4}, PC2 {:.4}",
                first, second
            );

            let mut plotter = PcaPlotter::new(&inputs, &labels, FigureSurface::new(&project_args.figure)?)?;
            // the start of training draws the projection alone
            plotter.on_train_begin(&model)?;
            println!("Projection written to file: {:?}", project_args.figure);
            Ok(())
        }
    }
}

/// The held-out data, or the training data when too little was held out to project
fn plotted_samples<'a>(training_data: &'a [Sample], validation_data: &'a [Sample]) -> &'a [Sample] {
    if validation_data.len() < 2 {
        training_data
    } else {
        validation_data
    }
}

fn final_validation_message(model: &LinearEmbedder, validation_data: &[Sample], margin: f64) -> String {
    match validate_embedder(model, validation_data, margin) {
        Ok(validation_loss) => format!("Final validation Loss: {}", validation_loss),
        Err(e) => format!("Final validation skipped: {}", e),
    }
}

fn unzip_samples(samples: &[Sample]) -> (Vec<Vec<f64>>, Vec<i64>) {
    samples
        .iter()
        .map(|sample| (sample.features().clone(), sample.label()))
        .unzip()
}

fn extension_of(path: &Path) -> Result<&str, Box<dyn Error>> {
    path.extension()
        .and_then(|extension| extension.to_str())
        .ok_or_else(|| {
            format!(
                "No file extension found for {} - unable to determine file format",
                path.display()
            )
            .into()
        })
}

fn serialize_model(
    model_output_file: &Path,
    trained_model: &LinearEmbedder,
) -> Result<File, Box<dyn Error>> {
    println!("Saving model to file: {:?}", model_output_file);
    let file_extension = extension_of(model_output_file)?;
    let mut out_file = File::create(model_output_file)?;
    match file_extension {
        "pkl" => serde_pickle::to_writer(&mut out_file, trained_model, Default::default())?,
        "json" => serde_json::to_writer(&mut out_file, trained_model)?,
        "cbor" => ciborium::into_writer(trained_model, &mut out_file)?,
        _ => return Err(format!("Unsupported file extension: {}", file_extension).into()),
    }
    Ok(out_file)
}

fn validate_output_file_extension(output_file_path: &Path) -> Result<(), Box<dyn Error>> {
    match extension_of(output_file_path)? {
        "pkl" | "json" | "cbor" => Ok(()),
        file_extension => Err(format!("Unsupported file extension: {}", file_extension).into()),
    }
}

fn deserialize_model(model_input_file: &Path) -> Result<LinearEmbedder, Box<dyn Error>> {
    println!("Loading model from file: {:?}", model_input_file);
    let file_extension = extension_of(model_input_file)?;
    let file = File::open(model_input_file)?;
    let model: LinearEmbedder = match file_extension {
        "pkl" => serde_pickle::from_reader(file, Default::default())?,
        "json" => serde_json::from_reader(file)?,
        "cbor" => ciborium::from_reader(file)?,
        _ => return Err(format!("Unsupported file extension: {}", file_extension).into()),
    };
    Ok(model)
}

/// Reports training to the terminal: a progress bar over epochs, and a timestamped line per epoch
struct TrainingProgress {
    pb: ProgressBar,
    should_log: bool,
}

impl TrainingProgress {
    fn new(total_epochs: u64, should_log: bool) -> Result<Self, indicatif::style::TemplateError> {
        let pb = ProgressBar::new(total_epochs);
        pb.set_style(ProgressStyle::default_bar().template(
            "[{elapsed_precise}] [{bar:40.green/white}] {human_pos}/{human_len} epochs ({eta}) {msg}",
        )?);
        Ok(TrainingProgress { pb, should_log })
    }

    fn into_inner(self) -> ProgressBar {
        self.pb
    }
}

impl TrainingObserver<LinearEmbedder> for TrainingProgress {
    fn on_train_begin(&mut self, model: &LinearEmbedder) -> Result<(), ObserverError> {
        self.pb.set_message(format!(
            "{} -> {}",
            model.input_dimension(),
            model.embedding_dimension()
        ));
        Ok(())
    }

    fn on_epoch_end(&mut self, _model: &LinearEmbedder, epoch: usize, logs: &EpochLogs) -> Result<(), ObserverError> {
        let line = format!(
            "{} Epoch {}: Training Loss: {}, Validation Loss: {}",
            chrono::Local::now(),
            epoch,
            format_loss(logs.loss),
            format_loss(logs.validation_loss)
        );
        self.pb.inc(1);
        self.pb.println(&line);
        if self.should_log {
            println!("{}", line);
        }
        Ok(())
    }
}

fn format_loss(loss: Option<f64>) -> String {
    loss.map_or_else(|| "-".to_string(), |loss| loss.to_string())
}

#[derive(Deserialize, Debug)]
#[cfg_attr(test, derive(serde::Serialize, PartialEq))]
struct ClassificationSample {
    features: Vec<f64>,
    label: String,
}

const SUPPORTED_EXTENSIONS: [&str; 3] = ["pkl", "json", "avro"];

fn load_rows<T: DeserializeOwned>(data_file_path: &Path) -> Result<Vec<T>, Box<dyn Error>> {
    let file_extension = extension_of(data_file_path)?;
    let file = File::open(data_file_path)?;
    let rows: Vec<T> = match file_extension {
        "pkl" => serde_pickle::from_reader(file, Default::default())?,
        "json" => serde_json::from_reader(file)?,
        "avro" => {
            let mut data: Vec<T> = vec![];
            let avro_reader = apache_avro::Reader::new(file)?;
            for value in avro_reader {
                data.push(apache_avro::from_value(&value?)?);
            }
            data
        }
        _ => {
            return Err(format!(
                "UNABLE TO LOAD DATA: unsupported file extension: {}. Supported extensions are: {}",
                file_extension,
                SUPPORTED_EXTENSIONS.join(", ")
            )
            .into())
        }
    };
    Ok(rows)
}

fn load_classification_data(
    data_file_path: &Path,
    validation_split: f64,
    classes: &[String],
) -> Result<(Vec<Sample>, Vec<Sample>), Box<dyn Error>> {
    // load the raw data with string labels
    let raw_data: Vec<ClassificationSample> = load_rows(data_file_path)?;

    // the position of each class in the list becomes its label
    let class_map: FxHashMap<&str, i64> = FxHashMap::from_iter(
        classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i as i64)),
    );
    println!("Using class map: {:?}", class_map);

    let mut data = Vec::with_capacity(raw_data.len());
    for raw_sample in raw_data {
        let Some(&label) = class_map.get(raw_sample.label.as_str()) else {
            continue; // ignore data points with labels not in the provided class list
        };
        data.push(Sample::new(raw_sample.features, label));
    }

    split_data(validation_split, data)
}

fn split_data(
    validation_split: f64,
    data: Vec<Sample>,
) -> Result<(Vec<Sample>, Vec<Sample>), Box<dyn Error>> {
    if !(0.0..1.0).contains(&validation_split) {
        return Err(format!(
            "validation split must be at least 0 and less than 1, got {}",
            validation_split
        )
        .into());
    }
    let rows_kept = data.len();
    // separate the data into training and validation sets
    let mut validation_indecies: FxHashSet<usize> = FxHashSet::default();
    while validation_indecies.len() < (validation_split * data.len() as f64) as usize {
        let index = rand::random::<usize>() % data.len();
        validation_indecies.insert(index);
    }
    let mut training_data: Vec<Sample> = Vec::with_capacity(data.len() - validation_indecies.len());
    let mut validation_data: Vec<Sample> = Vec::with_capacity(validation_indecies.len());
    for (i, sample) in data.into_iter().enumerate() {
        if validation_indecies.contains(&i) {
            validation_data.push(sample);
        } else {
            training_data.push(sample);
        }
    }
    assert!(
        training_data.len() + validation_data.len() == rows_kept,
        "Data split error. Training: {}, Validation: {}, Total: {}",
        training_data.len(),
        validation_data.len(),
        rows_kept
    );
    println!(
        "Data loaded. Training: {}, Validation: {}",
        training_data.len(),
        validation_data.len()
    );
    Ok((training_data, validation_data))
}
